//! Permalink and target path resolution.

use std::path::{Path, PathBuf};

use serde::Serialize;

use quire_frontmatter::{ExpandedValue, Iterators};

/// File name appended to permalinks ending in a separator.
pub const INDEX_FILE: &str = "index.html";

/// Template extensions stripped when deriving a default permalink.
const TEMPLATE_EXTENSIONS: &[&str] = &["twig", "md", "markdown", "rst", "j2", "jinja", "tera"];

/// The public path of an output page plus equivalent paths that redirect to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Permalink {
    pub canonical: String,
    pub redirects: Vec<String>,
}

impl Permalink {
    /// A permalink without redirects.
    pub fn new(canonical: impl Into<String>) -> Self {
        Self {
            canonical: canonical.into(),
            redirects: Vec::new(),
        }
    }
}

/// One addressable output page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Output {
    pub permalink: Permalink,

    /// Path relative to the output root
    pub target: PathBuf,

    /// Bindings that produced this output (empty unless expanded)
    pub iterators: Iterators,
}

/// Result of resolving an expanded permalink field.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// Permalink of the first output item
    pub canonical: Permalink,

    /// One entry per output item, in expansion order
    pub items: Vec<Output>,
}

/// Errors that can occur while resolving permalinks.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PermalinkError {
    #[error("No permalink values to resolve")]
    Empty,

    #[error("Permalink '{0}' escapes the output directory")]
    EscapesOutputRoot(String),
}

/// Resolves expanded permalink values into outputs.
#[derive(Debug, Clone, Copy)]
pub struct Resolver {
    /// Clean up permalinks (see [`sanitize`]) before deriving targets
    pub sanitize: bool,
}

impl Default for Resolver {
    fn default() -> Self {
        Self { sanitize: true }
    }
}

impl Resolver {
    /// Resolve expanded permalink values.
    ///
    /// Values sharing the same iterator bindings describe the same output:
    /// the first is canonical and the rest are redirects. Without expansion
    /// every binding is empty, so a literal list becomes one output with
    /// redirects; with expansion each binding is its own output.
    pub fn resolve(&self, values: &[ExpandedValue]) -> Result<Resolution, PermalinkError> {
        let mut groups: Vec<(&Iterators, Vec<String>)> = Vec::new();

        for value in values {
            let link = self.normalize(&value.evaluated)?;

            match groups.iter_mut().find(|(bindings, _)| **bindings == value.iterators) {
                Some((_, links)) => links.push(link),
                None => groups.push((&value.iterators, vec![link])),
            }
        }

        let items = groups
            .into_iter()
            .map(|(bindings, links)| -> Result<Output, PermalinkError> {
                let mut links = links.into_iter();
                let canonical = links.next().ok_or(PermalinkError::Empty)?;

                let mut redirects: Vec<String> = Vec::new();
                for link in links {
                    if link != canonical && !redirects.contains(&link) {
                        redirects.push(link);
                    }
                }

                Ok(Output {
                    target: target_path(&canonical)?,
                    permalink: Permalink {
                        canonical,
                        redirects,
                    },
                    iterators: bindings.clone(),
                })
            })
            .collect::<Result<Vec<_>, PermalinkError>>()?;

        let canonical = items
            .first()
            .map(|item| item.permalink.clone())
            .ok_or(PermalinkError::Empty)?;

        Ok(Resolution { canonical, items })
    }

    /// Attach extra redirects (from `redirect_from`) to resolved outputs.
    ///
    /// A value with bindings goes to the output bound to the same elements;
    /// a value without bindings belongs to the canonical output.
    pub fn add_redirects(
        &self,
        resolution: &mut Resolution,
        values: &[ExpandedValue],
    ) -> Result<(), PermalinkError> {
        for value in values {
            let link = self.normalize(&value.evaluated)?;

            let item = if value.iterators.is_empty() {
                resolution.items.first_mut()
            } else {
                resolution.items.iter_mut().find(|item| {
                    value
                        .iterators
                        .iter()
                        .all(|(name, bound)| item.iterators.get(name) == Some(bound))
                })
            };

            let Some(item) = item else {
                tracing::debug!("No output matches redirect {}", link);
                continue;
            };

            if item.permalink.canonical != link && !item.permalink.redirects.contains(&link) {
                item.permalink.redirects.push(link);
            }
        }

        if let Some(first) = resolution.items.first() {
            resolution.canonical = first.permalink.clone();
        }

        Ok(())
    }

    fn normalize(&self, raw: &str) -> Result<String, PermalinkError> {
        let link = if self.sanitize {
            sanitize(raw)
        } else if raw.starts_with('/') {
            raw.to_string()
        } else {
            format!("/{}", raw)
        };

        if link.split('/').any(|segment| segment == ".." || segment == ".") {
            return Err(PermalinkError::EscapesOutputRoot(link));
        }

        Ok(link)
    }
}

/// Resolve with the default resolver.
pub fn resolve(values: &[ExpandedValue]) -> Result<Resolution, PermalinkError> {
    Resolver::default().resolve(values)
}

/// Clean up a permalink: force a leading `/`, collapse repeated separators,
/// turn spaces into hyphens, drop characters outside `[A-Za-z0-9._~/-]` and
/// lowercase the rest.
pub fn sanitize(raw: &str) -> String {
    let mut link = String::with_capacity(raw.len() + 1);
    link.push('/');
    let mut after_separator = true;

    for ch in raw.trim().chars() {
        match ch {
            '/' | '\\' => {
                if !after_separator {
                    link.push('/');
                    after_separator = true;
                }
            }
            ' ' => {
                link.push('-');
                after_separator = false;
            }
            c if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '~') => {
                link.push(c.to_ascii_lowercase());
                after_separator = false;
            }
            _ => {}
        }
    }

    link
}

/// Output path for a permalink, relative to the output root.
///
/// A trailing separator means a "pretty URL" and gets [`INDEX_FILE`] appended;
/// anything else is an explicit file path.
pub fn target_path(permalink: &str) -> Result<PathBuf, PermalinkError> {
    let mut target = PathBuf::new();

    for segment in permalink.split('/').filter(|s| !s.is_empty()) {
        if segment == ".." || segment == "." {
            return Err(PermalinkError::EscapesOutputRoot(permalink.to_string()));
        }
        target.push(segment);
    }

    if permalink.ends_with('/') || target.as_os_str().is_empty() {
        target.push(INDEX_FILE);
    }

    Ok(target)
}

/// Permalink for a page that does not declare one, from its path inside the
/// pages folder: `about.html.twig` becomes `/about.html`, `docs/intro.md`
/// becomes `/docs/intro.html`.
pub fn default_permalink(path_in_folder: &Path) -> String {
    let mut segments: Vec<String> = path_in_folder
        .components()
        .filter_map(|c| match c {
            std::path::Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();

    if let Some(filename) = segments.pop() {
        let mut parts: Vec<&str> = filename.split('.').collect();
        if parts.len() > 1 {
            if let Some(ext) = parts.last() {
                if TEMPLATE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()) {
                    parts.pop();
                }
            }
        }

        let mut name = parts.join(".");
        if parts.len() == 1 {
            name.push_str(".html");
        }
        segments.push(name);
    }

    format!("/{}", segments.join("/"))
}
