//! Domain layer shared by configuration, artifacts, and services.
//!
//! This module contains:
//! - Error type
//! - Environment variable reader
//! - Logger with rotation

mod env;
mod error;
pub mod logger;

pub use env::Env;
pub use error::DeployError;
