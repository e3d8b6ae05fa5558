//! Renderer trait definition.

use crate::config::ConfigTree;
use crate::domain::DeployError;

/// Trait for deployment artifact renderers.
///
/// Output depends only on the configuration passed in: no clock, randomness,
/// or environment reads.
pub trait Renderer: Send + Sync {
    /// Render the complete artifact document.
    fn render(&self, config: &ConfigTree) -> Result<String, DeployError>;
}
