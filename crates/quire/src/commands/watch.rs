//! Watch command: compile, then recompile what each change affects.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use quire_pages::{Site, SiteCompiler};
use quire_watch::{plan_rebuild, FileWatcher, RebuildPlan, WatchConfig, DEFAULT_DEBOUNCE};

use crate::commands::build::{report, write_manifest};
use crate::config;

/// Run the watch command until interrupted.
pub async fn run(config_path: &Path, manifest: Option<PathBuf>, drafts: bool) -> Result<()> {
    let (mut compiler, mut site) = full_build(config_path, drafts)?;
    let publish = |site: &Site| -> Result<()> {
        report(site);
        if let Some(path) = &manifest {
            write_manifest(site, path)?;
        }
        Ok(())
    };
    publish(&site)?;

    let watch_paths = config::watch_paths(compiler.config(), config_path);
    let (watcher, mut rx) =
        FileWatcher::new(&watch_paths, DEFAULT_DEBOUNCE).context("Failed to start watcher")?;

    let watch_config = WatchConfig {
        root: compiler.config().root.clone(),
        // The config file always sits at the site root
        config_files: config_path
            .file_name()
            .map(PathBuf::from)
            .into_iter()
            .collect(),
    };

    tracing::info!("Watching {} paths, press Ctrl-C to stop", watch_paths.len());

    loop {
        let batch = tokio::select! {
            batch = rx.recv() => match batch {
                Some(batch) => batch,
                None => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        };

        match plan_rebuild(&site.graph, &batch, &watch_config) {
            RebuildPlan::Nothing => {
                tracing::debug!("{} changes, nothing to rebuild", batch.len());
                continue;
            }
            RebuildPlan::Full { reason } => {
                tracing::info!("Full rebuild: {}", reason);
                match full_build(config_path, drafts) {
                    Ok((new_compiler, new_site)) => {
                        compiler = new_compiler;
                        site = new_site;
                    }
                    Err(e) => {
                        tracing::error!("Rebuild failed: {:#}", e);
                        continue;
                    }
                }
            }
            RebuildPlan::Incremental { sources, outputs } => {
                tracing::info!(
                    "Rebuilding {} sources ({} affected outputs)",
                    sources.len(),
                    outputs.len()
                );
                let sources: Vec<PathBuf> = sources.into_iter().collect();
                if let Err(e) = compiler.refresh(&mut site, &sources) {
                    tracing::error!("Rebuild failed: {}", e);
                    continue;
                }
            }
        }

        if let Err(e) = publish(&site) {
            tracing::error!("{:#}", e);
        }
    }

    drop(watcher);
    tracing::info!("Stopped watching");

    Ok(())
}

fn full_build(config_path: &Path, drafts: bool) -> Result<(SiteCompiler, Site)> {
    let mut config = config::load(config_path)?;
    config.drafts |= drafts;

    let compiler = SiteCompiler::new(config);
    let site = compiler.compile()?;

    Ok((compiler, site))
}
