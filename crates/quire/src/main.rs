//! quire CLI - static site pipeline with permalink expansion.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

mod commands;
mod config;

#[derive(Parser)]
#[command(name = "quire")]
#[command(about = "Static site pipeline with permalink expansion and incremental rebuilds")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to quire.toml config file
    #[arg(short, long, default_value = config::CONFIG_FILE)]
    config: PathBuf,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a site in the current directory
    Init {
        /// Overwrite existing files
        #[arg(short, long)]
        yes: bool,
    },

    /// Compile the site and report its pages
    Build {
        /// Write the render manifest (JSON) to this file, or `-` for stdout
        #[arg(short, long)]
        manifest: Option<PathBuf>,

        /// Stop at the first failing file
        #[arg(long)]
        fail_fast: bool,

        /// Include pages and items marked as drafts
        #[arg(long)]
        drafts: bool,
    },

    /// Compile the site and recompile on changes
    Watch {
        /// Rewrite the render manifest (JSON) after every rebuild
        #[arg(short, long)]
        manifest: Option<PathBuf>,

        /// Include pages and items marked as drafts
        #[arg(long)]
        drafts: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Init { yes } => {
            commands::init::run(&cli.config, yes).await?;
        }
        Commands::Build {
            manifest,
            fail_fast,
            drafts,
        } => {
            commands::build::run(&cli.config, manifest, fail_fast, drafts).await?;
        }
        Commands::Watch { manifest, drafts } => {
            commands::watch::run(&cli.config, manifest, drafts).await?;
        }
    }

    Ok(())
}
