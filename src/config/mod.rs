//! Configuration management module.
//!
//! Handles the typed configuration tree, environment-sourced defaults,
//! JSON file loading with checksum verification, and validation.

mod defaults;
mod integrity;
mod service;
mod types;
mod validation;

pub use types::*;

pub use integrity::Verification;
pub use service::{apply, ConfigService, LoadOutcome};
pub use validation::{validate, ValidationContext, ValidationReport, DEFAULT_CACHE_URL_VAR};

#[cfg(test)]
pub(crate) use defaults::defaults;
