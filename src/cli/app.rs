//! Main CLI application structure

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use super::output::{Output, OutputFormat};
use super::{document_cmd, extensions_cmd};
use crate::storage::{Config, RuntimeConfig};

/// Environment variable holding the log filter
pub const LOG_ENV: &str = "TAGTREE_LOG";

#[derive(Parser)]
#[command(name = "tagtree")]
#[command(author, version, about = "Convert between typed objects and tagged YAML trees")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output format (defaults to the global configuration)
    #[arg(long, short = 'f', global = true)]
    pub format: Option<OutputFormat>,

    /// Enable debug logging
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List installed extensions
    Extensions {
        /// Format version to check extensions against
        #[arg(long)]
        format_version: Option<String>,
    },

    /// List the tags enabled for a format version
    Tags {
        /// Format version to list tags for
        #[arg(long)]
        format_version: Option<String>,
    },

    /// Show a document's version, recorded extensions and tags
    Inspect {
        /// Document to inspect
        file: PathBuf,
    },

    /// Read a document and write it back out
    Convert {
        /// Document to convert
        file: PathBuf,

        /// Where to write the result (defaults to stdout)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },
}

/// Main entry point for the CLI
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = Config::load()?;
    debug!(project_root = ?config.project_root, "Loaded configuration");

    let runtime = RuntimeConfig::from_config(&config)?;
    let output = Output::new(
        cli.format
            .unwrap_or_else(|| config.global.default_format.into()),
    );

    match cli.command {
        Commands::Extensions { format_version } => {
            extensions_cmd::list_extensions(&output, &runtime, format_version.as_deref())?
        }
        Commands::Tags { format_version } => {
            extensions_cmd::list_tags(&output, &runtime, format_version.as_deref())?
        }
        Commands::Inspect { file } => document_cmd::inspect(&output, &runtime, &file)?,
        Commands::Convert { file, output: target } => {
            document_cmd::convert(&output, &runtime, &file, target.as_deref())?
        }
    }

    debug!("Command completed successfully");
    Ok(())
}

/// Installs the stderr log subscriber
///
/// `--verbose` forces `debug`; otherwise the filter comes from
/// `TAGTREE_LOG`, falling back to `warn`.
fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_filter(filter),
        )
        .try_init();
}
