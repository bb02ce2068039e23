//! Initialize a site skeleton.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Run the init command.
///
/// The site is created in the directory holding `config_path`.
pub async fn run(config_path: &Path, yes: bool) -> Result<()> {
    tracing::info!("Initializing quire site...");

    let root = config_path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    if config_path.exists() && !yes {
        tracing::warn!(
            "{} already exists. Use --yes to overwrite.",
            config_path.display()
        );
        return Ok(());
    }

    let files: [(&Path, &str); 6] = [
        (config_path, DEFAULT_CONFIG),
        (Path::new("_layouts/base.html.twig"), DEFAULT_LAYOUT),
        (Path::new("_pages/index.html.twig"), DEFAULT_INDEX),
        (Path::new("_pages/blog.html.twig"), DEFAULT_BLOG),
        (Path::new("_pages/menu.html.twig"), DEFAULT_MENU),
        (Path::new("_posts/hello-world.md"), DEFAULT_POST),
    ];

    for (relative, content) in files {
        let path = if relative == config_path {
            relative.to_path_buf()
        } else {
            root.join(relative)
        };

        if path.exists() && !yes {
            continue;
        }

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::write(&path, content).with_context(|| format!("Failed to write {}", path.display()))?;
        tracing::info!("Created {}", path.display());
    }

    tracing::info!("Initialization complete!");
    tracing::info!("Run 'quire build' to compile the site.");

    Ok(())
}

const DEFAULT_CONFIG: &str = r#"# quire configuration

[site]
# Folders holding page definitions
pages = ["_pages"]

# Folders holding shared layouts and partials
templates = ["_layouts"]

# Front matter fields that may expand over arrays (permalink always does)
expandable = ["permalink", "redirect_from"]

[[collections]]
name = "posts"
folder = "_posts"

[build]
# Stop at the first failing file
fail_fast = false

# Include drafts
drafts = false
"#;

const DEFAULT_LAYOUT: &str = r#"<!doctype html>
<html>
  <head><title>{{ page.title }}</title></head>
  <body>{% block body %}{% endblock %}</body>
</html>
"#;

const DEFAULT_INDEX: &str = r#"---
title: Home
permalink: /
---
{% extends "_layouts/base.html.twig" %}
{% block body %}<h1>Welcome</h1>{% endblock %}
"#;

const DEFAULT_BLOG: &str = r#"---
collection: posts
permalink: /blog/%year/%basename/
---
{% extends "_layouts/base.html.twig" %}
{% block body %}<article>{{ item.body }}</article>{% endblock %}
"#;

const DEFAULT_MENU: &str = r#"---
title: Menu
meals: [breakfast, lunch, dinner]
permalink: /menu/%meals/
---
{% extends "_layouts/base.html.twig" %}
{% block body %}<h1>{{ iterators.meals }}</h1>{% endblock %}
"#;

const DEFAULT_POST: &str = r#"---
title: Hello World
date: 2024-01-15
---
# Hello World

Your first post.
"#;
