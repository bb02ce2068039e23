//! Site build command.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use quire_pages::{Site, SiteCompiler};

use crate::config;

/// Run the build command.
pub async fn run(config_path: &Path, manifest: Option<PathBuf>, fail_fast: bool, drafts: bool) -> Result<()> {
    tracing::info!("Building site...");

    let mut config = config::load(config_path)?;
    config.fail_fast |= fail_fast;
    config.drafts |= drafts;

    let site = SiteCompiler::new(config).compile()?;

    report(&site);

    if let Some(path) = manifest {
        write_manifest(&site, &path)?;
    }

    let failed = site.errors().count();
    if failed > 0 {
        bail!("{} files failed to compile", failed);
    }

    Ok(())
}

/// Log a summary of a compiled site.
pub fn report(site: &Site) {
    for error in site.errors() {
        tracing::error!("{}", error);
    }

    for collision in &site.collisions {
        tracing::warn!(
            "Target collision at {} between {} pages",
            collision.target.display(),
            collision.pages.len()
        );
    }

    tracing::info!(
        "{} pages, {} outputs, {} graph nodes",
        site.pages.len(),
        site.output_count(),
        site.graph.len()
    );
}

/// Write the render contexts as JSON; `-` means stdout.
pub fn write_manifest(site: &Site, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(&site.contexts).context("Failed to serialize manifest")?;

    if path == Path::new("-") {
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{}", json).context("Failed to write manifest to stdout")?;
    } else {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
        tracing::info!("Manifest: {}", path.display());
    }

    Ok(())
}
