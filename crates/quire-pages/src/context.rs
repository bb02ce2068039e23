//! Immutable settings threaded through page construction.

use std::path::{Path, PathBuf};

use quire_frontmatter::{Expander, DEFAULT_EXPANDABLE_FIELDS};

use crate::permalink::{default_permalink, Resolver};

/// Site-wide settings that influence how a single page is evaluated.
///
/// Passed by reference into every construction call; nothing here changes
/// during a build.
#[derive(Debug, Clone)]
pub struct SiteContext {
    /// Front matter fields that may expand into several values
    pub expandable_fields: Vec<String>,

    /// Clean up permalinks before deriving target paths
    pub sanitize_permalinks: bool,

    /// Page folders, relative to the site root, used for default permalinks
    pub page_folders: Vec<PathBuf>,
}

impl Default for SiteContext {
    fn default() -> Self {
        Self {
            expandable_fields: DEFAULT_EXPANDABLE_FIELDS
                .iter()
                .map(|field| field.to_string())
                .collect(),
            sanitize_permalinks: true,
            page_folders: vec![PathBuf::from("_pages")],
        }
    }
}

impl SiteContext {
    /// A fresh expander configured with the expandable fields.
    pub fn expander(&self) -> Expander {
        Expander::with_expandable_fields(self.expandable_fields.iter().cloned())
    }

    /// The permalink resolver for this site.
    pub fn resolver(&self) -> Resolver {
        Resolver {
            sanitize: self.sanitize_permalinks,
        }
    }

    /// Default permalink for a page source (relative to the site root).
    pub fn default_permalink(&self, source: &Path) -> String {
        let inner = self
            .page_folders
            .iter()
            .find_map(|folder| source.strip_prefix(folder).ok())
            .unwrap_or(source);

        default_permalink(inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_permalink_strips_page_folder() {
        let ctx = SiteContext::default();

        assert_eq!(
            ctx.default_permalink(Path::new("_pages/about.html.twig")),
            "/about.html"
        );
        assert_eq!(ctx.default_permalink(Path::new("misc/x.md")), "/misc/x.html");
    }

    #[test]
    fn expander_always_expands_permalink() {
        let ctx = SiteContext {
            expandable_fields: vec!["redirect_from".to_string()],
            ..Default::default()
        };

        let expander = ctx.expander();

        assert!(expander.is_expandable("permalink"));
        assert!(expander.is_expandable("redirect_from"));
    }
}
