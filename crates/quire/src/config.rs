//! Site configuration file (quire.toml).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use quire_pages::{NamedFolder, SiteConfig};

/// Default configuration file name.
pub const CONFIG_FILE: &str = "quire.toml";

/// Configuration file structure.
#[derive(Debug, Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    site: SiteSection,
    #[serde(default)]
    collections: Vec<FolderEntry>,
    #[serde(default)]
    datasets: Vec<FolderEntry>,
    #[serde(default)]
    build: BuildSection,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct SiteSection {
    pages: Vec<String>,
    templates: Vec<String>,
    /// Fields that may expand besides `permalink`
    expandable: Vec<String>,
    sanitize_permalinks: bool,
}

impl Default for SiteSection {
    fn default() -> Self {
        Self {
            pages: vec!["_pages".to_string()],
            templates: vec!["_layouts".to_string()],
            expandable: vec!["permalink".to_string()],
            sanitize_permalinks: true,
        }
    }
}

#[derive(Debug, Deserialize)]
struct FolderEntry {
    name: String,
    folder: String,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct BuildSection {
    fail_fast: bool,
    drafts: bool,
}

/// Load the site configuration.
///
/// The site root is the directory holding the config file, canonicalized so
/// watcher events (always absolute) can be matched against it. A missing
/// file yields the defaults; a malformed one is an error.
pub fn load(path: &Path) -> Result<SiteConfig> {
    let root = site_root(path);

    let file: ConfigFile = if path.exists() {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let file = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        tracing::info!("Loaded config from {}", path.display());
        file
    } else {
        tracing::debug!("No {} found, using defaults", path.display());
        ConfigFile::default()
    };

    Ok(into_site_config(file, root))
}

/// Canonical directory holding the config file.
fn site_root(config_path: &Path) -> PathBuf {
    let root = config_path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    fs::canonicalize(&root).unwrap_or(root)
}

fn into_site_config(file: ConfigFile, root: PathBuf) -> SiteConfig {
    let folders = |entries: Vec<FolderEntry>| -> Vec<NamedFolder> {
        entries
            .into_iter()
            .map(|entry| NamedFolder {
                name: entry.name,
                folder: PathBuf::from(entry.folder),
            })
            .collect()
    };

    SiteConfig {
        root,
        pages: file.site.pages.into_iter().map(PathBuf::from).collect(),
        templates: file.site.templates.into_iter().map(PathBuf::from).collect(),
        collections: folders(file.collections),
        datasets: folders(file.datasets),
        expandable: file.site.expandable,
        sanitize_permalinks: file.site.sanitize_permalinks,
        drafts: file.build.drafts,
        fail_fast: file.build.fail_fast,
    }
}

/// Paths to watch for a site: its folders and the config file.
pub fn watch_paths(config: &SiteConfig, config_file: &Path) -> Vec<PathBuf> {
    let mut paths: Vec<PathBuf> = config
        .pages
        .iter()
        .chain(config.templates.iter())
        .chain(config.collections.iter().map(|c| &c.folder))
        .chain(config.datasets.iter().map(|d| &d.folder))
        .map(|folder| config.root.join(folder))
        .collect();
    paths.push(config_file.to_path_buf());
    paths
}
