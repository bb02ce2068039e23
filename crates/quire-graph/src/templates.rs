//! Template reference scanning.
//!
//! Finds `{% extends %}`, `{% include %}` and friends in template sources and
//! records them as graph edges so that changing a shared layout can be traced
//! back to the pages using it.

use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use walkdir::WalkDir;

use crate::graph::{path_key, DependencyGraph};

static TEMPLATE_REF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\{%-?\s*(extends|include|import|from|embed|use)\s+["']([^"']+)["']"#)
        .expect("Invalid template reference regex")
});

/// How a template is referenced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateRelation {
    /// `{% extends %}`
    Extends,
    /// `{% include %}`, `{% import %}`, `{% from %}`, `{% embed %}`, `{% use %}`
    Includes,
}

/// A reference to another template found in a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateRef {
    pub relation: TemplateRelation,
    /// Template name as written, normalised to a graph key
    pub name: String,
}

/// Errors that can occur while scanning templates.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("Templates directory not found: {0}")]
    DirectoryNotFound(String),
}

/// Extract template references from a source.
pub fn scan_source(source: &str) -> Vec<TemplateRef> {
    TEMPLATE_REF_RE
        .captures_iter(source)
        .filter_map(|caps| {
            let relation = match caps.get(1)?.as_str() {
                "extends" => TemplateRelation::Extends,
                _ => TemplateRelation::Includes,
            };
            let name = path_key(Path::new(caps.get(2)?.as_str()));

            Some(TemplateRef { relation, name })
        })
        .collect()
}

/// Record the references in `source` as edges onto `consumer`.
///
/// Returns the number of references found.
pub fn register_references(graph: &mut DependencyGraph, consumer: &Path, source: &str) -> usize {
    let references = scan_source(source);

    for reference in &references {
        let template = Path::new(&reference.name);
        match reference.relation {
            TemplateRelation::Extends => graph.register_template_extend(template, consumer),
            TemplateRelation::Includes => graph.register_template_include(template, consumer),
        }
    }

    references.len()
}

/// Scan a template folder and register every template and its references.
///
/// `root` is the site root; template keys are relative to it, matching the
/// names templates use to reference each other. Returns the number of
/// templates scanned.
pub fn scan_templates(
    root: &Path,
    dir: &Path,
    graph: &mut DependencyGraph,
) -> Result<usize, ScanError> {
    let full_dir = root.join(dir);
    if !full_dir.exists() {
        return Err(ScanError::DirectoryNotFound(full_dir.display().to_string()));
    }

    let mut count = 0;

    for entry in WalkDir::new(&full_dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();

        if !path.is_file() {
            continue;
        }

        // Skip hidden files (editor swap files and the like)
        let filename = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
        if filename.starts_with('.') {
            continue;
        }

        let source = match fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!("Skipping unreadable template {}: {}", path.display(), e);
                continue;
            }
        };

        let relative = path.strip_prefix(root).unwrap_or(path);
        graph.register_template(relative);
        register_references(graph, relative, &source);
        count += 1;
    }

    tracing::debug!("Scanned {} templates in {}", count, full_dir.display());

    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn finds_references() {
        let source = r#"
{% extends "_layouts/base.html.twig" %}
{% block content %}
  {% include '_includes/nav.html.twig' %}
  {%- import "./_macros/forms.twig" as forms -%}
{% endblock %}
"#;

        let refs = scan_source(source);

        assert_eq!(
            refs,
            vec![
                TemplateRef {
                    relation: TemplateRelation::Extends,
                    name: "_layouts/base.html.twig".into()
                },
                TemplateRef {
                    relation: TemplateRelation::Includes,
                    name: "_includes/nav.html.twig".into()
                },
                TemplateRef {
                    relation: TemplateRelation::Includes,
                    name: "_macros/forms.twig".into()
                },
            ]
        );
    }

    #[test]
    fn ignores_dynamic_references() {
        assert!(scan_source("{% include template_name %}").is_empty());
    }

    #[test]
    fn scans_template_directory() {
        let temp = tempdir().unwrap();
        let layouts = temp.path().join("_layouts");
        fs::create_dir_all(&layouts).unwrap();

        fs::write(layouts.join("base.html"), "<html>{% block body %}{% endblock %}</html>").unwrap();
        fs::write(
            layouts.join("post.html"),
            r#"{% extends "_layouts/base.html" %}"#,
        )
        .unwrap();
        fs::write(layouts.join(".post.html.swp"), "junk").unwrap();

        let mut graph = DependencyGraph::new();
        let count = scan_templates(temp.path(), Path::new("_layouts"), &mut graph).unwrap();

        assert_eq!(count, 2);
        assert!(graph.is_template(Path::new("_layouts/base.html")));
        assert_eq!(
            graph.parent_template(Path::new("_layouts/post.html")),
            Some("_layouts/base.html")
        );
    }

    #[test]
    fn missing_directory_is_an_error() {
        let temp = tempdir().unwrap();
        let mut graph = DependencyGraph::new();

        let result = scan_templates(temp.path(), Path::new("_layouts"), &mut graph);

        assert!(matches!(result, Err(ScanError::DirectoryNotFound(_))));
    }
}
