//! Deployment artifact generation.
//!
//! Each target has its own renderer. YAML targets build a typed model and
//! serialize it; the proxy target renders a tagged-variant model by hand.

mod compose;
mod kubernetes;
mod nginx;
mod prometheus;
mod renderer;

pub use compose::ComposeRenderer;
pub use kubernetes::KubernetesRenderer;
pub use nginx::NginxRenderer;
pub use prometheus::PrometheusRenderer;
pub use renderer::Renderer;

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::ConfigTree;
use crate::domain::DeployError;

/// Generated artifact targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum ArtifactKind {
    /// Kubernetes manifest
    Kubernetes,
    /// Docker Compose file
    Compose,
    /// nginx reverse-proxy configuration
    Nginx,
    /// Prometheus scrape configuration
    Prometheus,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 4] = [
        ArtifactKind::Kubernetes,
        ArtifactKind::Compose,
        ArtifactKind::Nginx,
        ArtifactKind::Prometheus,
    ];

    /// Stable output file name.
    pub fn file_name(&self) -> &'static str {
        match self {
            ArtifactKind::Kubernetes => "kubernetes.yaml",
            ArtifactKind::Compose => "docker-compose.yml",
            ArtifactKind::Nginx => "nginx.conf",
            ArtifactKind::Prometheus => "prometheus.yml",
        }
    }

    pub fn renderer(&self) -> &'static dyn Renderer {
        match self {
            ArtifactKind::Kubernetes => &KubernetesRenderer,
            ArtifactKind::Compose => &ComposeRenderer,
            ArtifactKind::Nginx => &NginxRenderer,
            ArtifactKind::Prometheus => &PrometheusRenderer,
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ArtifactKind::Kubernetes => "kubernetes",
            ArtifactKind::Compose => "compose",
            ArtifactKind::Nginx => "nginx",
            ArtifactKind::Prometheus => "prometheus",
        };
        f.write_str(name)
    }
}

/// Render one artifact.
pub fn render(kind: ArtifactKind, config: &ConfigTree) -> Result<String, DeployError> {
    kind.renderer().render(config)
}

/// Write rendered artifacts into `dir` under their stable file names.
pub fn write_artifacts(
    dir: &Path,
    artifacts: &[(ArtifactKind, String)],
) -> Result<Vec<PathBuf>, DeployError> {
    fs::create_dir_all(dir)?;

    let mut written = Vec::with_capacity(artifacts.len());
    for (kind, content) in artifacts {
        let path = dir.join(kind.file_name());
        fs::write(&path, content)?;
        info!("Wrote {} artifact to {}", kind, path.display());
        written.push(path);
    }
    Ok(written)
}
