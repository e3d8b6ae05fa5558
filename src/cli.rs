//! CLI argument parsing and command definitions.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::artifacts::ArtifactKind;
use crate::config::DEFAULT_CACHE_URL_VAR;

/// Production configuration and deployment artifact generator
#[derive(Parser)]
#[command(
    name = "deploykit",
    version,
    about = "Production configuration and deployment artifact generator",
    long_about = "Loads a checksummed production configuration, validates it, and renders \
                  Kubernetes, Docker Compose, nginx, and Prometheus artifacts from it."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    /// (default: $DEPLOYKIT_CONFIG_PATH or /etc/deploykit/production.json)
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// Directory for debug log files
    #[arg(long, global = true)]
    pub log_dir: Option<PathBuf>,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,
}

/// Available subcommands
#[derive(Subcommand)]
pub enum Commands {
    /// Print the effective configuration as JSON
    Show,
    /// Write the effective configuration and its checksum to disk
    Init {
        /// Overwrite an existing configuration file
        #[arg(long)]
        force: bool,
    },
    /// Apply a partial JSON update and persist it
    Set {
        /// Partial configuration, e.g. '{"environment":{"domain":"example.org"}}'
        json: String,
    },
    /// Validate the effective configuration
    Validate {
        /// Variable holding the external cache connection string
        #[arg(long, default_value = DEFAULT_CACHE_URL_VAR)]
        cache_url_var: String,
    },
    /// Check the persisted configuration against its checksum
    Verify,
    /// Render deployment artifacts
    Generate {
        /// Artifact to render (default: all)
        #[arg(long, short = 't')]
        target: Option<ArtifactKind>,
        /// Write artifacts into this directory instead of stdout
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },
    /// Display version information
    Version,
}
