//! Error types for deploykit.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for configuration persistence and rendering.
#[derive(Debug, Error)]
pub enum DeployError {
    /// Writing the configuration file (or its directory) failed
    #[error("Failed to persist configuration to {}: {source}", path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Writing the checksum sidecar failed
    #[error("Failed to record checksum at {}: {source}", path.display())]
    Checksum {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A partial update could not be applied to the configuration tree
    #[error("Invalid configuration update: {0}")]
    InvalidUpdate(String),

    /// A structural invariant of the configuration tree is violated
    #[error("Configuration invariant violated: {0}")]
    Invariant(String),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// YAML rendering error
    #[error("Render error: {0}")]
    Render(#[from] serde_yaml::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
