//! Docker Compose renderer.
//!
//! The application service is always present. Redis, nginx, and the
//! Prometheus/Grafana pair are included when the matching features are on.

use serde::Serialize;
use std::collections::BTreeMap;

use super::{ArtifactKind, Renderer};
use crate::config::ConfigTree;
use crate::domain::DeployError;

const REDIS_IMAGE: &str = "redis:7-alpine";
const NGINX_IMAGE: &str = "nginx:1.27-alpine";
const PROMETHEUS_IMAGE: &str = "prom/prometheus:v2.54.1";
const GRAFANA_IMAGE: &str = "grafana/grafana:11.2.0";
const GRAFANA_HOST_PORT: u16 = 3001;

// Retry policy applied to the application container
const RETRY_CONDITION: &str = "on-failure";
const RETRY_DELAY: &str = "5s";
const RETRY_MAX_ATTEMPTS: u32 = 3;

/// Renders the compose descriptor.
pub struct ComposeRenderer;

#[derive(Serialize)]
struct ComposeFile {
    services: BTreeMap<&'static str, Service>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    volumes: BTreeMap<&'static str, NamedVolume>,
}

#[derive(Serialize)]
struct NamedVolume {}

#[derive(Serialize)]
struct Service {
    image: String,
    restart: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    command: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    ports: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    expose: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    environment: BTreeMap<&'static str, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    volumes: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    depends_on: Vec<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    healthcheck: Option<Healthcheck>,
    #[serde(skip_serializing_if = "Option::is_none")]
    deploy: Option<Deploy>,
}

impl Service {
    fn new(image: impl Into<String>, restart: &'static str) -> Self {
        Self {
            image: image.into(),
            restart,
            command: Vec::new(),
            ports: Vec::new(),
            expose: Vec::new(),
            environment: BTreeMap::new(),
            volumes: Vec::new(),
            depends_on: Vec::new(),
            healthcheck: None,
            deploy: None,
        }
    }
}

#[derive(Serialize)]
struct Healthcheck {
    test: Vec<String>,
    interval: String,
    timeout: String,
    retries: u32,
}

#[derive(Serialize)]
struct Deploy {
    resources: DeployResources,
    restart_policy: RetryPolicy,
}

#[derive(Serialize)]
struct DeployResources {
    limits: ResourceBounds,
    reservations: ResourceBounds,
}

#[derive(Serialize)]
struct ResourceBounds {
    cpus: String,
    memory: String,
}

#[derive(Serialize)]
struct RetryPolicy {
    condition: &'static str,
    delay: &'static str,
    max_attempts: u32,
}

/// Convert a Kubernetes CPU quantity (`500m`, `2`) to compose `cpus`.
fn compose_cpus(quantity: &str) -> String {
    let Some(millis) = quantity
        .strip_suffix('m')
        .and_then(|m| m.parse::<u64>().ok())
    else {
        return quantity.to_string();
    };
    let (whole, frac) = (millis / 1000, millis % 1000);
    if frac == 0 {
        whole.to_string()
    } else {
        format!("{}.{:03}", whole, frac)
            .trim_end_matches('0')
            .to_string()
    }
}

/// Convert a Kubernetes memory quantity (`512Mi`, `1Gi`) to compose syntax.
fn compose_memory(quantity: &str) -> String {
    match quantity.strip_suffix('i') {
        Some(base) if base.ends_with(['K', 'M', 'G', 'T']) => base.to_string(),
        _ => quantity.to_string(),
    }
}

fn app_service(
    config: &ConfigTree,
    restart: &'static str,
    with_redis: bool,
    behind_proxy: bool,
) -> Service {
    let deploy = &config.deployment;
    let vertical = &deploy.scaling.vertical;
    let health = &config.monitoring.health_check;

    let mut app = Service::new(deploy.image.clone(), restart);
    if behind_proxy {
        app.expose.push(deploy.port.to_string());
    } else {
        app.ports.push(format!("{0}:{0}", deploy.port));
    }

    app.environment.insert("APP_ENV", config.environment.name.clone());
    app.environment.insert("PORT", deploy.port.to_string());
    app.environment
        .insert("LOG_LEVEL", config.monitoring.logging.level.to_string());
    if with_redis {
        app.environment
            .insert("REDIS_URL", "redis://redis:6379".to_string());
        app.depends_on.push("redis");
    }

    if health.enabled {
        app.healthcheck = Some(Healthcheck {
            test: vec![
                "CMD".to_string(),
                "curl".to_string(),
                "-f".to_string(),
                format!("http://localhost:{}{}", deploy.port, health.path),
            ],
            interval: format!("{}s", health.interval_seconds),
            timeout: format!("{}s", health.timeout_seconds),
            retries: 3,
        });
    }

    app.deploy = Some(Deploy {
        resources: DeployResources {
            limits: ResourceBounds {
                cpus: compose_cpus(&vertical.cpu_limit),
                memory: compose_memory(&vertical.memory_limit),
            },
            reservations: ResourceBounds {
                cpus: compose_cpus(&vertical.cpu_request),
                memory: compose_memory(&vertical.memory_request),
            },
        },
        restart_policy: RetryPolicy {
            condition: RETRY_CONDITION,
            delay: RETRY_DELAY,
            max_attempts: RETRY_MAX_ATTEMPTS,
        },
    });

    app
}

impl Renderer for ComposeRenderer {
    fn render(&self, config: &ConfigTree) -> Result<String, DeployError> {
        let restart = config.deployment.restart_policy.as_str();
        let with_redis = config.performance.cache.redis_enabled;
        let with_proxy = config.security.tls.enabled;
        let with_metrics = config.monitoring.metrics.enabled;

        let mut services = BTreeMap::new();
        let mut volumes = BTreeMap::new();

        services.insert("app", app_service(config, restart, with_redis, with_proxy));

        if with_redis {
            let mut redis = Service::new(REDIS_IMAGE, restart);
            redis.command = vec![
                "redis-server".to_string(),
                "--appendonly".to_string(),
                "yes".to_string(),
                "--maxmemory".to_string(),
                format!("{}mb", config.performance.cache.max_size_mb),
                "--maxmemory-policy".to_string(),
                "allkeys-lru".to_string(),
            ];
            redis.volumes.push("redis-data:/data".to_string());
            redis.healthcheck = Some(Healthcheck {
                test: vec!["CMD".to_string(), "redis-cli".to_string(), "ping".to_string()],
                interval: "10s".to_string(),
                timeout: "3s".to_string(),
                retries: 3,
            });
            services.insert("redis", redis);
            volumes.insert("redis-data", NamedVolume {});
        }

        if with_proxy {
            let tls = &config.security.tls;
            let mut nginx = Service::new(NGINX_IMAGE, restart);
            nginx.ports = vec!["80:80".to_string(), "443:443".to_string()];
            nginx.volumes = vec![
                format!(
                    "./{}:/etc/nginx/conf.d/default.conf:ro",
                    ArtifactKind::Nginx.file_name()
                ),
                format!("{0}:{0}:ro", tls.cert_path),
                format!("{0}:{0}:ro", tls.key_path),
            ];
            nginx.depends_on.push("app");
            services.insert("nginx", nginx);
        }

        if with_metrics {
            let mut prometheus = Service::new(PROMETHEUS_IMAGE, restart);
            prometheus.command = vec![
                "--config.file=/etc/prometheus/prometheus.yml".to_string(),
                "--storage.tsdb.path=/prometheus".to_string(),
            ];
            prometheus.ports.push("9090:9090".to_string());
            prometheus.volumes = vec![
                format!(
                    "./{}:/etc/prometheus/prometheus.yml:ro",
                    ArtifactKind::Prometheus.file_name()
                ),
                "prometheus-data:/prometheus".to_string(),
            ];
            prometheus.depends_on.push("app");
            services.insert("prometheus", prometheus);
            volumes.insert("prometheus-data", NamedVolume {});

            let mut grafana = Service::new(GRAFANA_IMAGE, restart);
            grafana.ports.push(format!("{}:3000", GRAFANA_HOST_PORT));
            grafana.volumes.push("grafana-data:/var/lib/grafana".to_string());
            grafana.depends_on.push("prometheus");
            services.insert("grafana", grafana);
            volumes.insert("grafana-data", NamedVolume {});
        }

        Ok(serde_yaml::to_string(&ComposeFile { services, volumes })?)
    }
}
