//! SHA-256 sidecar checksums for the persisted configuration file.
//!
//! The checksum is unkeyed: it detects partial writes and edits that bypass
//! the manager, not deliberate tampering by someone who can rewrite both files.

use sha2::{Digest, Sha256};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::domain::DeployError;

/// Suffix appended to the configuration path to locate its checksum file.
pub const CHECKSUM_SUFFIX: &str = ".sha256";

/// Result of checking raw configuration bytes against the sidecar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    /// No usable checksum on disk yet
    NoBaseline,
    /// Digest matches the recorded checksum
    Match,
    /// Digest differs from the recorded checksum
    Mismatch { expected: String, actual: String },
    /// Checksum file exists but could not be read
    Unreadable(String),
}

impl Verification {
    /// Whether the bytes may be used.
    pub fn is_trusted(&self) -> bool {
        matches!(self, Verification::NoBaseline | Verification::Match)
    }
}

/// Computes and checks checksums against one sidecar file.
#[derive(Debug, Clone)]
pub struct IntegrityVerifier {
    checksum_path: PathBuf,
}

impl IntegrityVerifier {
    /// Verifier whose sidecar sits next to `config_path`.
    pub fn for_config(config_path: &Path) -> Self {
        let mut raw = config_path.as_os_str().to_owned();
        raw.push(CHECKSUM_SUFFIX);
        Self {
            checksum_path: PathBuf::from(raw),
        }
    }

    pub fn checksum_path(&self) -> &Path {
        &self.checksum_path
    }

    /// Lowercase hex SHA-256 of `raw`.
    pub fn digest(raw: &[u8]) -> String {
        hex::encode(Sha256::digest(raw))
    }

    /// Check `raw` (exactly as read from disk) against the recorded checksum.
    pub fn verify(&self, raw: &[u8]) -> Verification {
        let recorded = match fs::read_to_string(&self.checksum_path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No checksum at {}, first run", self.checksum_path.display());
                return Verification::NoBaseline;
            }
            Err(e) => {
                warn!(
                    "Failed to read checksum {}: {}",
                    self.checksum_path.display(),
                    e
                );
                return Verification::Unreadable(e.to_string());
            }
        };

        let expected = recorded.trim();
        if expected.is_empty() {
            warn!(
                "Checksum file {} is empty, treating as no baseline",
                self.checksum_path.display()
            );
            return Verification::NoBaseline;
        }

        let actual = Self::digest(raw);
        if actual.as_bytes() == expected.as_bytes() {
            Verification::Match
        } else {
            Verification::Mismatch {
                expected: expected.to_string(),
                actual,
            }
        }
    }

    /// Overwrite the sidecar with the checksum of `raw`.
    pub fn record(&self, raw: &[u8]) -> Result<(), DeployError> {
        let digest = Self::digest(raw);
        fs::write(&self.checksum_path, format!("{}\n", digest)).map_err(|source| {
            DeployError::Checksum {
                path: self.checksum_path.clone(),
                source,
            }
        })?;
        debug!("Recorded checksum {} at {}", digest, self.checksum_path.display());
        Ok(())
    }
}
