//! Prometheus scrape configuration renderer.

use serde::Serialize;

use super::Renderer;
use crate::config::ConfigTree;
use crate::domain::DeployError;

/// Well-known exporters scraped next to the application.
const EXPORTERS: &[(&str, &str)] = &[
    ("nginx", "nginx-exporter:9113"),
    ("postgres", "postgres-exporter:9187"),
    ("redis", "redis-exporter:9121"),
    ("node", "node-exporter:9100"),
];

/// Job name of the application target, independent of the app name.
const APP_JOB: &str = "app";

/// Renders the metrics-scrape configuration.
pub struct PrometheusRenderer;

#[derive(Serialize)]
struct ScrapeFile {
    global: Global,
    scrape_configs: Vec<ScrapeConfig>,
}

#[derive(Serialize)]
struct Global {
    scrape_interval: String,
    evaluation_interval: String,
    external_labels: ExternalLabels,
}

#[derive(Serialize)]
struct ExternalLabels {
    environment: String,
}

#[derive(Serialize)]
struct ScrapeConfig {
    job_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    metrics_path: Option<String>,
    static_configs: Vec<StaticConfig>,
}

#[derive(Serialize)]
struct StaticConfig {
    targets: Vec<String>,
}

impl ScrapeConfig {
    fn single(job_name: &str, target: String, metrics_path: Option<String>) -> Self {
        Self {
            job_name: job_name.to_string(),
            metrics_path,
            static_configs: vec![StaticConfig {
                targets: vec![target],
            }],
        }
    }
}

impl Renderer for PrometheusRenderer {
    fn render(&self, config: &ConfigTree) -> Result<String, DeployError> {
        let metrics = &config.monitoring.metrics;

        let mut scrape_configs = vec![ScrapeConfig::single(
            APP_JOB,
            format!("app:{}", metrics.port),
            Some(metrics.path.clone()),
        )];
        scrape_configs.extend(
            EXPORTERS
                .iter()
                .map(|(job, target)| ScrapeConfig::single(job, target.to_string(), None)),
        );

        let file = ScrapeFile {
            global: Global {
                scrape_interval: format!("{}s", metrics.scrape_interval_seconds),
                evaluation_interval: format!("{}s", metrics.evaluation_interval_seconds),
                external_labels: ExternalLabels {
                    environment: config.environment.name.clone(),
                },
            },
            scrape_configs,
        };
        Ok(serde_yaml::to_string(&file)?)
    }
}
