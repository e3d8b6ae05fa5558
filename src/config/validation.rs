//! Configuration validation.
//!
//! Two layers:
//! - [`check_invariants`] rejects trees that must never be loaded or stored
//! - [`validate`] reports semantic problems without blocking anything

use regex::Regex;
use std::fmt;
use std::path::Path;
use std::sync::OnceLock;

use super::ConfigTree;
use crate::config::types::WorkerCount;
use crate::domain::{DeployError, Env};

/// Default name of the variable holding the external cache connection string.
pub const DEFAULT_CACHE_URL_VAR: &str = "REDIS_URL";

/// Check the invariants that hold after every load and update.
pub fn check_invariants(config: &ConfigTree) -> Result<(), DeployError> {
    let horizontal = &config.deployment.scaling.horizontal;
    if horizontal.min_replicas > horizontal.max_replicas {
        return Err(DeployError::Invariant(format!(
            "minReplicas ({}) exceeds maxReplicas ({})",
            horizontal.min_replicas, horizontal.max_replicas
        )));
    }

    let tls = &config.security.tls;
    if tls.enabled {
        if tls.cert_path.trim().is_empty() {
            return Err(DeployError::Invariant(
                "TLS is enabled but certPath is empty".to_string(),
            ));
        }
        if tls.key_path.trim().is_empty() {
            return Err(DeployError::Invariant(
                "TLS is enabled but keyPath is empty".to_string(),
            ));
        }
    }

    if config.environment.domain.trim().is_empty() {
        return Err(DeployError::Invariant(
            "environment domain cannot be empty".to_string(),
        ));
    }

    // Rate-limit window and request count are NonZero types.
    Ok(())
}

/// Environment facts the validator needs beyond the tree itself.
#[derive(Debug, Clone)]
pub struct ValidationContext {
    /// Variable expected to hold the external cache connection string
    pub cache_url_var: String,
    pub cache_url_configured: bool,
}

impl ValidationContext {
    /// Inspect `env` for the cache connection string named `cache_url_var`.
    pub fn from_env(env: &Env, cache_url_var: &str) -> Self {
        Self {
            cache_url_var: cache_url_var.to_string(),
            cache_url_configured: env.is_set(cache_url_var),
        }
    }
}

/// Accumulated validation results.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    /// Valid when there are no errors; warnings never count.
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for error in &self.errors {
            writeln!(f, "error: {}", error)?;
        }
        for warning in &self.warnings {
            writeln!(f, "warning: {}", warning)?;
        }
        Ok(())
    }
}

fn cpu_quantity() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d+m|\d+(\.\d+)?)$").expect("valid CPU regex"))
}

fn memory_quantity() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\d+(Ki|Mi|Gi|Ti|K|M|G|T)?$").expect("valid memory regex")
    })
}

/// Validate configuration. Every rule runs; results accumulate.
pub fn validate(config: &ConfigTree, ctx: &ValidationContext) -> ValidationReport {
    let mut report = ValidationReport::default();

    let tls = &config.security.tls;
    if tls.enabled {
        for (label, path) in [("certificate", &tls.cert_path), ("key", &tls.key_path)] {
            if path.trim().is_empty() {
                report
                    .errors
                    .push(format!("TLS is enabled but the {} path is empty", label));
            } else if !Path::new(path).exists() {
                report
                    .errors
                    .push(format!("TLS {} file not found: {}", label, path));
            }
        }
    }

    if config.environment.domain.trim().is_empty() {
        report.errors.push("Environment domain is empty".to_string());
    }

    let horizontal = &config.deployment.scaling.horizontal;
    if horizontal.min_replicas > horizontal.max_replicas {
        report.errors.push(format!(
            "Replica bounds invalid: minReplicas ({}) exceeds maxReplicas ({})",
            horizontal.min_replicas, horizontal.max_replicas
        ));
    }

    let level = config.performance.compression.level;
    if !(1..=9).contains(&level) {
        report
            .errors
            .push(format!("Compression level {} is outside 1-9", level));
    }

    let pool = &config.database.pool;
    if pool.min > pool.max {
        report.errors.push(format!(
            "Database pool min ({}) exceeds max ({})",
            pool.min, pool.max
        ));
    }

    let vertical = &config.deployment.scaling.vertical;
    for (field, value) in [
        ("cpuRequest", &vertical.cpu_request),
        ("cpuLimit", &vertical.cpu_limit),
    ] {
        if !cpu_quantity().is_match(value) {
            report
                .errors
                .push(format!("Invalid CPU quantity for {}: '{}'", field, value));
        }
    }
    for (field, value) in [
        ("memoryRequest", &vertical.memory_request),
        ("memoryLimit", &vertical.memory_limit),
    ] {
        if !memory_quantity().is_match(value) {
            report
                .errors
                .push(format!("Invalid memory quantity for {}: '{}'", field, value));
        }
    }

    let clustering = &config.performance.clustering;
    if clustering.enabled
        && clustering.workers == WorkerCount::Auto
        && !config.monitoring.health_check.enabled
    {
        report.warnings.push(
            "Worker clustering is set to auto while health checks are disabled".to_string(),
        );
    }

    if config.performance.cache.redis_enabled && !ctx.cache_url_configured {
        report.warnings.push(format!(
            "Redis cache is enabled but {} is not set",
            ctx.cache_url_var
        ));
    }

    if config.security.firewall.allows_all() {
        report
            .warnings
            .push("Firewall allow-list permits all addresses".to_string());
    }

    let metrics = &config.monitoring.metrics;
    if metrics.enabled && metrics.port == config.deployment.port {
        report.warnings.push(format!(
            "Metrics port {} collides with the application port",
            metrics.port
        ));
    }

    report
}
