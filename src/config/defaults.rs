//! Default configuration tree with environment overrides.
//!
//! Every field resolves through [`setting`]: the named variable is parsed with
//! the field type's [`SettingValue`] rule, and the literal default is used when
//! the variable is absent, blank, or unparsable.

use serde::de::DeserializeOwned;
use std::num::{NonZeroU32, NonZeroU64};
use tracing::{debug, warn};

use super::types::*;
use crate::domain::Env;

/// Names of the environment variables that override defaults.
pub mod vars {
    pub const CONFIG_PATH: &str = "DEPLOYKIT_CONFIG_PATH";

    pub const ENV_NAME: &str = "APP_ENV_NAME";
    pub const DOMAIN: &str = "APP_DOMAIN";
    pub const CDN_URL: &str = "CDN_URL";
    pub const API_URL: &str = "API_URL";

    pub const TLS_ENABLED: &str = "TLS_ENABLED";
    pub const TLS_CERT_PATH: &str = "TLS_CERT_PATH";
    pub const TLS_KEY_PATH: &str = "TLS_KEY_PATH";
    pub const TLS_PROTOCOLS: &str = "TLS_PROTOCOLS";
    pub const TLS_HSTS: &str = "TLS_HSTS";
    pub const TLS_HSTS_MAX_AGE: &str = "TLS_HSTS_MAX_AGE";
    pub const FIREWALL_ENABLED: &str = "FIREWALL_ENABLED";
    pub const FIREWALL_ALLOW_LIST: &str = "FIREWALL_ALLOW_LIST";
    pub const RATE_LIMIT_WINDOW_MS: &str = "RATE_LIMIT_WINDOW_MS";
    pub const RATE_LIMIT_MAX: &str = "RATE_LIMIT_MAX";
    pub const ENCRYPTION_ALGORITHM: &str = "ENCRYPTION_ALGORITHM";
    pub const ENCRYPTION_KEY_ROTATION_DAYS: &str = "ENCRYPTION_KEY_ROTATION_DAYS";

    pub const CACHE_ENABLED: &str = "CACHE_ENABLED";
    pub const CACHE_TTL_SECONDS: &str = "CACHE_TTL_SECONDS";
    pub const CACHE_MAX_SIZE_MB: &str = "CACHE_MAX_SIZE_MB";
    pub const CACHE_REDIS_ENABLED: &str = "CACHE_REDIS_ENABLED";
    pub const COMPRESSION_GZIP: &str = "COMPRESSION_GZIP";
    pub const COMPRESSION_LEVEL: &str = "COMPRESSION_LEVEL";
    pub const COMPRESSION_BROTLI: &str = "COMPRESSION_BROTLI";
    pub const CLUSTER_ENABLED: &str = "CLUSTER_ENABLED";
    pub const CLUSTER_WORKERS: &str = "CLUSTER_WORKERS";

    pub const HEALTH_CHECK_ENABLED: &str = "HEALTH_CHECK_ENABLED";
    pub const HEALTH_CHECK_PATH: &str = "HEALTH_CHECK_PATH";
    pub const HEALTH_CHECK_INTERVAL: &str = "HEALTH_CHECK_INTERVAL";
    pub const HEALTH_CHECK_TIMEOUT: &str = "HEALTH_CHECK_TIMEOUT";
    pub const LOG_LEVEL: &str = "LOG_LEVEL";
    pub const LOG_FORMAT: &str = "LOG_FORMAT";
    pub const LOG_RETENTION_DAYS: &str = "LOG_RETENTION_DAYS";
    pub const METRICS_ENABLED: &str = "METRICS_ENABLED";
    pub const METRICS_PORT: &str = "METRICS_PORT";
    pub const METRICS_PATH: &str = "METRICS_PATH";
    pub const METRICS_SCRAPE_INTERVAL: &str = "METRICS_SCRAPE_INTERVAL";
    pub const METRICS_EVALUATION_INTERVAL: &str = "METRICS_EVALUATION_INTERVAL";

    pub const APP_NAME: &str = "APP_NAME";
    pub const APP_IMAGE: &str = "APP_IMAGE";
    pub const APP_PORT: &str = "APP_PORT";
    pub const DEPLOY_STRATEGY: &str = "DEPLOY_STRATEGY";
    pub const RESTART_POLICY: &str = "RESTART_POLICY";
    pub const ROLLBACK_ENABLED: &str = "ROLLBACK_ENABLED";
    pub const ROLLBACK_REVISION_HISTORY: &str = "ROLLBACK_REVISION_HISTORY";
    pub const HPA_ENABLED: &str = "HPA_ENABLED";
    pub const MIN_REPLICAS: &str = "MIN_REPLICAS";
    pub const MAX_REPLICAS: &str = "MAX_REPLICAS";
    pub const HPA_TARGET_CPU: &str = "HPA_TARGET_CPU";
    pub const CPU_REQUEST: &str = "CPU_REQUEST";
    pub const CPU_LIMIT: &str = "CPU_LIMIT";
    pub const MEMORY_REQUEST: &str = "MEMORY_REQUEST";
    pub const MEMORY_LIMIT: &str = "MEMORY_LIMIT";

    pub const DB_POOL_MIN: &str = "DB_POOL_MIN";
    pub const DB_POOL_MAX: &str = "DB_POOL_MAX";
    pub const DB_POOL_IDLE_TIMEOUT_MS: &str = "DB_POOL_IDLE_TIMEOUT_MS";
    pub const DB_POOL_ACQUIRE_TIMEOUT_MS: &str = "DB_POOL_ACQUIRE_TIMEOUT_MS";
    pub const DB_QUERY_CACHE: &str = "DB_QUERY_CACHE";
    pub const DB_PREPARED_STATEMENTS: &str = "DB_PREPARED_STATEMENTS";
    pub const DB_INDEX_HINTS: &str = "DB_INDEX_HINTS";
    pub const DB_BACKUP_ENABLED: &str = "DB_BACKUP_ENABLED";
    pub const DB_BACKUP_SCHEDULE: &str = "DB_BACKUP_SCHEDULE";
    pub const DB_BACKUP_RETENTION_DAYS: &str = "DB_BACKUP_RETENTION_DAYS";
}

const DEFAULT_MIN_REPLICAS: u32 = 3;
const DEFAULT_MAX_REPLICAS: u32 = 10;

/// Parsing rule for an environment-sourced value.
pub trait SettingValue: Sized {
    /// Parse a raw variable value; `None` means "use the literal default".
    fn parse_setting(raw: &str) -> Option<Self>;
}

impl SettingValue for String {
    fn parse_setting(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }
}

impl SettingValue for bool {
    fn parse_setting(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Some(true),
            "false" | "0" | "no" | "off" => Some(false),
            _ => None,
        }
    }
}

impl SettingValue for u16 {
    fn parse_setting(raw: &str) -> Option<Self> {
        raw.trim().parse().ok()
    }
}

impl SettingValue for u32 {
    fn parse_setting(raw: &str) -> Option<Self> {
        raw.trim().parse().ok()
    }
}

impl SettingValue for u64 {
    fn parse_setting(raw: &str) -> Option<Self> {
        raw.trim().parse().ok()
    }
}

impl SettingValue for NonZeroU32 {
    fn parse_setting(raw: &str) -> Option<Self> {
        raw.trim().parse().ok()
    }
}

impl SettingValue for NonZeroU64 {
    fn parse_setting(raw: &str) -> Option<Self> {
        raw.trim().parse().ok()
    }
}

/// Comma-separated list; blank entries are dropped.
impl SettingValue for Vec<String> {
    fn parse_setting(raw: &str) -> Option<Self> {
        Some(
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
        )
    }
}

impl SettingValue for WorkerCount {
    fn parse_setting(raw: &str) -> Option<Self> {
        raw.parse().ok()
    }
}

impl SettingValue for LogLevel {
    fn parse_setting(raw: &str) -> Option<Self> {
        keyword(raw)
    }
}

impl SettingValue for LogFormat {
    fn parse_setting(raw: &str) -> Option<Self> {
        keyword(raw)
    }
}

impl SettingValue for RolloutStrategy {
    fn parse_setting(raw: &str) -> Option<Self> {
        keyword(raw)
    }
}

impl SettingValue for RestartPolicy {
    fn parse_setting(raw: &str) -> Option<Self> {
        keyword(raw)
    }
}

/// Parse an enum by its serialized keyword.
fn keyword<T: DeserializeOwned>(raw: &str) -> Option<T> {
    let value = serde_json::Value::String(raw.trim().to_ascii_lowercase());
    serde_json::from_value(value).ok()
}

/// Resolve one setting: environment override when parsable, literal otherwise.
pub fn setting<T: SettingValue>(env: &Env, var: &str, default: T) -> T {
    let Some(raw) = env.var(var) else {
        return default;
    };
    match T::parse_setting(&raw) {
        Some(value) => {
            debug!("Override from {}", var);
            value
        }
        None => {
            debug!("Ignoring unparsable value for {}: {:?}", var, raw);
            default
        }
    }
}

fn text(env: &Env, var: &str, default: &str) -> String {
    setting(env, var, default.to_string())
}

fn non_zero_u32(value: u32) -> NonZeroU32 {
    NonZeroU32::new(value).unwrap_or(NonZeroU32::MIN)
}

fn non_zero_u64(value: u64) -> NonZeroU64 {
    NonZeroU64::new(value).unwrap_or(NonZeroU64::MIN)
}

/// Build the default configuration tree, applying environment overrides.
pub fn defaults(env: &Env) -> ConfigTree {
    let mut min_replicas = setting(env, vars::MIN_REPLICAS, DEFAULT_MIN_REPLICAS);
    let mut max_replicas = setting(env, vars::MAX_REPLICAS, DEFAULT_MAX_REPLICAS);
    if min_replicas > max_replicas {
        warn!(
            "{}={} exceeds {}={}; using default replica bounds",
            vars::MIN_REPLICAS,
            min_replicas,
            vars::MAX_REPLICAS,
            max_replicas
        );
        min_replicas = DEFAULT_MIN_REPLICAS;
        max_replicas = DEFAULT_MAX_REPLICAS;
    }

    ConfigTree {
        environment: EnvironmentConfig {
            name: text(env, vars::ENV_NAME, "production"),
            domain: text(env, vars::DOMAIN, "example.com"),
            cdn_url: text(env, vars::CDN_URL, "https://cdn.example.com"),
            api_url: text(env, vars::API_URL, "https://api.example.com"),
        },
        security: SecurityConfig {
            tls: TlsConfig {
                enabled: setting(env, vars::TLS_ENABLED, true),
                cert_path: text(env, vars::TLS_CERT_PATH, "/etc/ssl/certs/server.crt"),
                key_path: text(env, vars::TLS_KEY_PATH, "/etc/ssl/private/server.key"),
                protocols: setting(
                    env,
                    vars::TLS_PROTOCOLS,
                    vec!["TLSv1.2".to_string(), "TLSv1.3".to_string()],
                ),
                hsts: setting(env, vars::TLS_HSTS, true),
                hsts_max_age: setting(env, vars::TLS_HSTS_MAX_AGE, 31_536_000),
            },
            firewall: FirewallConfig {
                enabled: setting(env, vars::FIREWALL_ENABLED, true),
                allow_list: setting(env, vars::FIREWALL_ALLOW_LIST, Vec::new()),
                rate_limit: RateLimitConfig {
                    window_ms: setting(
                        env,
                        vars::RATE_LIMIT_WINDOW_MS,
                        non_zero_u64(15 * 60 * 1000),
                    ),
                    max_requests: setting(env, vars::RATE_LIMIT_MAX, non_zero_u32(100)),
                },
            },
            encryption: EncryptionConfig {
                algorithm: text(env, vars::ENCRYPTION_ALGORITHM, "aes-256-gcm"),
                key_rotation_days: setting(env, vars::ENCRYPTION_KEY_ROTATION_DAYS, 90),
            },
        },
        performance: PerformanceConfig {
            cache: CacheConfig {
                enabled: setting(env, vars::CACHE_ENABLED, true),
                ttl_seconds: setting(env, vars::CACHE_TTL_SECONDS, 3600),
                max_size_mb: setting(env, vars::CACHE_MAX_SIZE_MB, 512),
                redis_enabled: setting(env, vars::CACHE_REDIS_ENABLED, true),
            },
            compression: CompressionConfig {
                gzip: setting(env, vars::COMPRESSION_GZIP, true),
                level: setting(env, vars::COMPRESSION_LEVEL, 6),
                brotli: setting(env, vars::COMPRESSION_BROTLI, false),
            },
            clustering: ClusteringConfig {
                enabled: setting(env, vars::CLUSTER_ENABLED, true),
                workers: setting(env, vars::CLUSTER_WORKERS, WorkerCount::Auto),
            },
        },
        monitoring: MonitoringConfig {
            health_check: HealthCheckConfig {
                enabled: setting(env, vars::HEALTH_CHECK_ENABLED, true),
                path: text(env, vars::HEALTH_CHECK_PATH, "/health"),
                interval_seconds: setting(env, vars::HEALTH_CHECK_INTERVAL, 30),
                timeout_seconds: setting(env, vars::HEALTH_CHECK_TIMEOUT, 5),
            },
            logging: LoggingConfig {
                level: setting(env, vars::LOG_LEVEL, LogLevel::Info),
                format: setting(env, vars::LOG_FORMAT, LogFormat::Json),
                retention_days: setting(env, vars::LOG_RETENTION_DAYS, 30),
            },
            metrics: MetricsConfig {
                enabled: setting(env, vars::METRICS_ENABLED, true),
                port: setting(env, vars::METRICS_PORT, 9090),
                path: text(env, vars::METRICS_PATH, "/metrics"),
                scrape_interval_seconds: setting(env, vars::METRICS_SCRAPE_INTERVAL, 15),
                evaluation_interval_seconds: setting(env, vars::METRICS_EVALUATION_INTERVAL, 15),
            },
        },
        deployment: DeploymentConfig {
            app_name: text(env, vars::APP_NAME, "app"),
            image: text(env, vars::APP_IMAGE, "app:latest"),
            port: setting(env, vars::APP_PORT, 3000),
            strategy: setting(env, vars::DEPLOY_STRATEGY, RolloutStrategy::Rolling),
            restart_policy: setting(env, vars::RESTART_POLICY, RestartPolicy::UnlessStopped),
            rollback: RollbackConfig {
                enabled: setting(env, vars::ROLLBACK_ENABLED, true),
                revision_history: setting(env, vars::ROLLBACK_REVISION_HISTORY, 5),
            },
            scaling: ScalingConfig {
                horizontal: HorizontalScalingConfig {
                    enabled: setting(env, vars::HPA_ENABLED, true),
                    min_replicas,
                    max_replicas,
                    target_cpu_utilization: setting(env, vars::HPA_TARGET_CPU, 70),
                },
                vertical: VerticalScalingConfig {
                    cpu_request: text(env, vars::CPU_REQUEST, "500m"),
                    cpu_limit: text(env, vars::CPU_LIMIT, "1000m"),
                    memory_request: text(env, vars::MEMORY_REQUEST, "512Mi"),
                    memory_limit: text(env, vars::MEMORY_LIMIT, "1Gi"),
                },
            },
        },
        database: DatabaseConfig {
            pool: PoolConfig {
                min: setting(env, vars::DB_POOL_MIN, 2),
                max: setting(env, vars::DB_POOL_MAX, 10),
                idle_timeout_ms: setting(env, vars::DB_POOL_IDLE_TIMEOUT_MS, 30_000),
                acquire_timeout_ms: setting(env, vars::DB_POOL_ACQUIRE_TIMEOUT_MS, 60_000),
            },
            optimization: OptimizationConfig {
                query_cache: setting(env, vars::DB_QUERY_CACHE, true),
                prepared_statements: setting(env, vars::DB_PREPARED_STATEMENTS, true),
                index_hints: setting(env, vars::DB_INDEX_HINTS, false),
            },
            backup: BackupConfig {
                enabled: setting(env, vars::DB_BACKUP_ENABLED, true),
                schedule: text(env, vars::DB_BACKUP_SCHEDULE, "0 2 * * *"),
                retention_days: setting(env, vars::DB_BACKUP_RETENTION_DAYS, 30),
            },
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env() -> Env {
        Env::mock(Vec::<(&str, &str)>::new())
    }

    #[test]
    fn test_literal_defaults() {
        let config = defaults(&no_env());

        assert_eq!(config.environment.name, "production");
        assert_eq!(config.environment.domain, "example.com");
        assert_eq!(config.deployment.scaling.horizontal.min_replicas, 3);
        assert_eq!(config.deployment.scaling.horizontal.max_replicas, 10);
        assert_eq!(config.security.firewall.rate_limit.window_ms.get(), 900_000);
        assert_eq!(config.security.firewall.rate_limit.max_requests.get(), 100);
        assert_eq!(config.performance.clustering.workers, WorkerCount::Auto);
        assert_eq!(config.deployment.strategy, RolloutStrategy::Rolling);
    }

    #[test]
    fn test_defaults_are_deterministic() {
        assert_eq!(defaults(&no_env()), defaults(&no_env()));
    }

    #[test]
    fn test_env_overrides() {
        let env = Env::mock([
            (vars::DOMAIN, "shop.example.org"),
            (vars::MIN_REPLICAS, "2"),
            (vars::MAX_REPLICAS, "6"),
            (vars::TLS_ENABLED, "off"),
            (vars::CLUSTER_WORKERS, "8"),
            (vars::DEPLOY_STRATEGY, "Recreate"),
            (vars::RESTART_POLICY, "on-failure"),
            (vars::FIREWALL_ALLOW_LIST, "10.0.0.0/8, 192.168.0.0/16,"),
            (vars::CPU_LIMIT, "2"),
        ]);
        let config = defaults(&env);

        assert_eq!(config.environment.domain, "shop.example.org");
        assert_eq!(config.deployment.scaling.horizontal.min_replicas, 2);
        assert_eq!(config.deployment.scaling.horizontal.max_replicas, 6);
        assert!(!config.security.tls.enabled);
        assert_eq!(
            config.performance.clustering.workers,
            WorkerCount::Fixed(NonZeroU32::new(8).unwrap())
        );
        assert_eq!(config.deployment.strategy, RolloutStrategy::Recreate);
        assert_eq!(config.deployment.restart_policy, RestartPolicy::OnFailure);
        assert_eq!(
            config.security.firewall.allow_list,
            vec!["10.0.0.0/8".to_string(), "192.168.0.0/16".to_string()]
        );
        assert_eq!(config.deployment.scaling.vertical.cpu_limit, "2");
    }

    #[test]
    fn test_unparsable_overrides_fall_back() {
        let env = Env::mock([
            (vars::MIN_REPLICAS, "three"),
            (vars::RATE_LIMIT_MAX, "0"),
            (vars::RATE_LIMIT_WINDOW_MS, "-5"),
            (vars::DOMAIN, "   "),
            (vars::TLS_HSTS, "maybe"),
            (vars::LOG_LEVEL, "verbose"),
        ]);
        let config = defaults(&env);

        assert_eq!(config.deployment.scaling.horizontal.min_replicas, 3);
        assert_eq!(config.security.firewall.rate_limit.max_requests.get(), 100);
        assert_eq!(config.security.firewall.rate_limit.window_ms.get(), 900_000);
        assert_eq!(config.environment.domain, "example.com");
        assert!(config.security.tls.hsts);
        assert_eq!(config.monitoring.logging.level, LogLevel::Info);
    }

    #[test]
    fn test_inverted_replica_overrides_fall_back() {
        let env = Env::mock([(vars::MIN_REPLICAS, "12"), (vars::MAX_REPLICAS, "4")]);
        let config = defaults(&env);

        assert_eq!(config.deployment.scaling.horizontal.min_replicas, 3);
        assert_eq!(config.deployment.scaling.horizontal.max_replicas, 10);
    }
}
