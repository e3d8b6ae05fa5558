//! Configuration data types.
//!
//! The tree is always complete: persisted overlays and partial updates are
//! merged onto a full tree before they are deserialized into these types.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::{NonZeroU32, NonZeroU64};
use std::str::FromStr;

/// Full production configuration tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigTree {
    pub environment: EnvironmentConfig,
    pub security: SecurityConfig,
    pub performance: PerformanceConfig,
    pub monitoring: MonitoringConfig,
    pub deployment: DeploymentConfig,
    pub database: DatabaseConfig,
}

/// Environment identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentConfig {
    /// Environment name, also used as the orchestration namespace
    pub name: String,
    /// Public domain served by the reverse proxy
    pub domain: String,
    pub cdn_url: String,
    pub api_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityConfig {
    pub tls: TlsConfig,
    pub firewall: FirewallConfig,
    pub encryption: EncryptionConfig,
}

/// TLS termination settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TlsConfig {
    pub enabled: bool,
    /// Certificate file path (must be non-empty when enabled)
    pub cert_path: String,
    /// Private key file path (must be non-empty when enabled)
    pub key_path: String,
    pub protocols: Vec<String>,
    /// Emit a Strict-Transport-Security header
    pub hsts: bool,
    /// HSTS max-age in seconds
    pub hsts_max_age: u64,
}

/// Firewall and rate-limit policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FirewallConfig {
    pub enabled: bool,
    /// CIDR ranges allowed through the firewall
    pub allow_list: Vec<String>,
    pub rate_limit: RateLimitConfig,
}

/// Allow-list entries that admit every address.
const UNRESTRICTED_SENTINELS: &[&str] = &["0.0.0.0/0", "::/0", "*"];

impl FirewallConfig {
    /// Whether an allow-list entry admits every address.
    pub fn is_unrestricted(entry: &str) -> bool {
        UNRESTRICTED_SENTINELS.contains(&entry.trim())
    }

    /// Whether any allow-list entry admits every address.
    pub fn allows_all(&self) -> bool {
        self.allow_list.iter().any(|entry| Self::is_unrestricted(entry))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitConfig {
    /// Window length in milliseconds
    pub window_ms: NonZeroU64,
    /// Requests allowed per window
    pub max_requests: NonZeroU32,
}

impl RateLimitConfig {
    /// Requests per minute, floored, never below one.
    pub fn requests_per_minute(&self) -> u64 {
        let per_minute =
            u64::from(self.max_requests.get()).saturating_mul(60_000) / self.window_ms.get();
        per_minute.max(1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptionConfig {
    pub algorithm: String,
    pub key_rotation_days: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceConfig {
    pub cache: CacheConfig,
    pub compression: CompressionConfig,
    pub clustering: ClusteringConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheConfig {
    pub enabled: bool,
    pub ttl_seconds: u64,
    pub max_size_mb: u32,
    /// In-memory cache layer backed by an external Redis instance
    pub redis_enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressionConfig {
    pub gzip: bool,
    /// gzip compression level (1-9)
    pub level: u32,
    pub brotli: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusteringConfig {
    pub enabled: bool,
    pub workers: WorkerCount,
}

/// Worker process count: sized from available CPUs, or fixed.
///
/// Serialized as the string `"auto"` or a positive integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "WorkerCountRepr", into = "WorkerCountRepr")]
pub enum WorkerCount {
    Auto,
    Fixed(NonZeroU32),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum WorkerCountRepr {
    Count(u32),
    Keyword(String),
}

impl TryFrom<WorkerCountRepr> for WorkerCount {
    type Error = String;

    fn try_from(repr: WorkerCountRepr) -> Result<Self, Self::Error> {
        match repr {
            WorkerCountRepr::Count(n) => NonZeroU32::new(n)
                .map(WorkerCount::Fixed)
                .ok_or_else(|| "worker count must be positive".to_string()),
            WorkerCountRepr::Keyword(s) => s.parse(),
        }
    }
}

impl From<WorkerCount> for WorkerCountRepr {
    fn from(workers: WorkerCount) -> Self {
        match workers {
            WorkerCount::Auto => WorkerCountRepr::Keyword("auto".to_string()),
            WorkerCount::Fixed(n) => WorkerCountRepr::Count(n.get()),
        }
    }
}

impl FromStr for WorkerCount {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("auto") {
            return Ok(WorkerCount::Auto);
        }
        s.parse::<NonZeroU32>()
            .map(WorkerCount::Fixed)
            .map_err(|_| format!("invalid worker count '{}'", s))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringConfig {
    pub health_check: HealthCheckConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthCheckConfig {
    pub enabled: bool,
    pub path: String,
    pub interval_seconds: u32,
    pub timeout_seconds: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    pub retention_days: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Text,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
    pub path: String,
    pub scrape_interval_seconds: u32,
    pub evaluation_interval_seconds: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentConfig {
    pub app_name: String,
    pub image: String,
    /// Port the application container listens on
    pub port: u16,
    pub strategy: RolloutStrategy,
    pub restart_policy: RestartPolicy,
    pub rollback: RollbackConfig,
    pub scaling: ScalingConfig,
}

/// How new application versions replace old ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RolloutStrategy {
    Rolling,
    Recreate,
}

/// Container restart policy for the compose target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartPolicy {
    No,
    Always,
    OnFailure,
    UnlessStopped,
}

impl RestartPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RestartPolicy::No => "no",
            RestartPolicy::Always => "always",
            RestartPolicy::OnFailure => "on-failure",
            RestartPolicy::UnlessStopped => "unless-stopped",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackConfig {
    pub enabled: bool,
    /// Old revisions kept for rollback
    pub revision_history: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScalingConfig {
    pub horizontal: HorizontalScalingConfig,
    pub vertical: VerticalScalingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HorizontalScalingConfig {
    pub enabled: bool,
    pub min_replicas: u32,
    pub max_replicas: u32,
    /// Target average CPU utilization, percent
    pub target_cpu_utilization: u32,
}

/// Per-container resource requests and limits, in Kubernetes quantity syntax.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerticalScalingConfig {
    pub cpu_request: String,
    pub cpu_limit: String,
    pub memory_request: String,
    pub memory_limit: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseConfig {
    pub pool: PoolConfig,
    pub optimization: OptimizationConfig,
    pub backup: BackupConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolConfig {
    pub min: u32,
    pub max: u32,
    pub idle_timeout_ms: u64,
    pub acquire_timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationConfig {
    pub query_cache: bool,
    pub prepared_statements: bool,
    pub index_hints: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupConfig {
    pub enabled: bool,
    /// Cron expression
    pub schedule: String,
    pub retention_days: u32,
}
