//! Kubernetes manifest renderer.
//!
//! Emits a Deployment and a Service, plus a HorizontalPodAutoscaler when
//! horizontal scaling is enabled and an Ingress when TLS is enabled.

use serde::Serialize;
use std::collections::BTreeMap;

use super::Renderer;
use crate::config::{ConfigTree, HealthCheckConfig, RolloutStrategy, VerticalScalingConfig};
use crate::domain::DeployError;

const SERVICE_PORT: u16 = 80;
const LIVENESS_INITIAL_DELAY_SECONDS: u32 = 30;
const READINESS_INITIAL_DELAY_SECONDS: u32 = 5;
const PROBE_FAILURE_THRESHOLD: u32 = 3;

/// Renders the orchestration manifest.
pub struct KubernetesRenderer;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Resource<S> {
    api_version: &'static str,
    kind: &'static str,
    metadata: Metadata,
    spec: S,
}

#[derive(Serialize)]
struct Metadata {
    name: String,
    namespace: String,
    labels: BTreeMap<String, String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DeploymentSpec {
    replicas: u32,
    revision_history_limit: u32,
    selector: LabelSelector,
    strategy: DeploymentStrategy,
    template: PodTemplate,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LabelSelector {
    match_labels: BTreeMap<String, String>,
}

/// Rollout policy as Kubernetes spells it.
#[derive(Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
enum DeploymentStrategy {
    RollingUpdate {
        #[serde(rename = "rollingUpdate")]
        rolling_update: RollingUpdateBounds,
    },
    Recreate,
}

#[derive(Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
struct RollingUpdateBounds {
    max_surge: u32,
    max_unavailable: u32,
}

impl From<RolloutStrategy> for DeploymentStrategy {
    fn from(strategy: RolloutStrategy) -> Self {
        match strategy {
            RolloutStrategy::Rolling => DeploymentStrategy::RollingUpdate {
                rolling_update: RollingUpdateBounds {
                    max_surge: 1,
                    max_unavailable: 1,
                },
            },
            RolloutStrategy::Recreate => DeploymentStrategy::Recreate,
        }
    }
}

#[derive(Serialize)]
struct PodTemplate {
    metadata: PodMetadata,
    spec: PodSpec,
}

#[derive(Serialize)]
struct PodMetadata {
    labels: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    annotations: BTreeMap<String, String>,
}

#[derive(Serialize)]
struct PodSpec {
    containers: Vec<Container>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Container {
    name: String,
    image: String,
    ports: Vec<ContainerPort>,
    env: Vec<EnvVar>,
    resources: Resources,
    #[serde(skip_serializing_if = "Option::is_none")]
    liveness_probe: Option<Probe>,
    #[serde(skip_serializing_if = "Option::is_none")]
    readiness_probe: Option<Probe>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ContainerPort {
    name: &'static str,
    container_port: u16,
}

#[derive(Serialize)]
struct EnvVar {
    name: &'static str,
    value: String,
}

#[derive(Serialize)]
struct Resources {
    requests: ResourceList,
    limits: ResourceList,
}

#[derive(Serialize)]
struct ResourceList {
    cpu: String,
    memory: String,
}

impl Resources {
    fn from_config(vertical: &VerticalScalingConfig) -> Self {
        Self {
            requests: ResourceList {
                cpu: vertical.cpu_request.clone(),
                memory: vertical.memory_request.clone(),
            },
            limits: ResourceList {
                cpu: vertical.cpu_limit.clone(),
                memory: vertical.memory_limit.clone(),
            },
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Probe {
    http_get: HttpGet,
    initial_delay_seconds: u32,
    period_seconds: u32,
    timeout_seconds: u32,
    failure_threshold: u32,
}

#[derive(Serialize)]
struct HttpGet {
    path: String,
    port: u16,
}

impl Probe {
    fn http(health: &HealthCheckConfig, port: u16, initial_delay_seconds: u32) -> Self {
        Self {
            http_get: HttpGet {
                path: health.path.clone(),
                port,
            },
            initial_delay_seconds,
            period_seconds: health.interval_seconds,
            timeout_seconds: health.timeout_seconds,
            failure_threshold: PROBE_FAILURE_THRESHOLD,
        }
    }
}

#[derive(Serialize)]
struct ServiceSpec {
    #[serde(rename = "type")]
    service_type: &'static str,
    selector: BTreeMap<String, String>,
    ports: Vec<ServicePort>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ServicePort {
    name: &'static str,
    protocol: &'static str,
    port: u16,
    target_port: u16,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AutoscalerSpec {
    scale_target_ref: ScaleTargetRef,
    min_replicas: u32,
    max_replicas: u32,
    metrics: Vec<MetricSpec>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ScaleTargetRef {
    api_version: &'static str,
    kind: &'static str,
    name: String,
}

#[derive(Serialize)]
struct MetricSpec {
    #[serde(rename = "type")]
    metric_type: &'static str,
    resource: ResourceMetric,
}

#[derive(Serialize)]
struct ResourceMetric {
    name: &'static str,
    target: MetricTarget,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MetricTarget {
    #[serde(rename = "type")]
    target_type: &'static str,
    average_utilization: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IngressSpec {
    ingress_class_name: &'static str,
    tls: Vec<IngressTls>,
    rules: Vec<IngressRule>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IngressTls {
    hosts: Vec<String>,
    secret_name: String,
}

#[derive(Serialize)]
struct IngressRule {
    host: String,
    http: IngressHttp,
}

#[derive(Serialize)]
struct IngressHttp {
    paths: Vec<IngressPath>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IngressPath {
    path: &'static str,
    path_type: &'static str,
    backend: IngressBackend,
}

#[derive(Serialize)]
struct IngressBackend {
    service: BackendService,
}

#[derive(Serialize)]
struct BackendService {
    name: String,
    port: BackendPort,
}

#[derive(Serialize)]
struct BackendPort {
    number: u16,
}

fn app_labels(config: &ConfigTree) -> BTreeMap<String, String> {
    BTreeMap::from([("app".to_string(), config.deployment.app_name.clone())])
}

fn metadata(config: &ConfigTree, name: String) -> Metadata {
    let mut labels = app_labels(config);
    labels.insert(
        "environment".to_string(),
        config.environment.name.clone(),
    );
    Metadata {
        name,
        namespace: config.environment.name.clone(),
        labels,
    }
}

fn deployment(config: &ConfigTree) -> Resource<DeploymentSpec> {
    let deploy = &config.deployment;
    let health = &config.monitoring.health_check;
    let metrics = &config.monitoring.metrics;

    let (liveness_probe, readiness_probe) = if health.enabled {
        (
            Some(Probe::http(health, deploy.port, LIVENESS_INITIAL_DELAY_SECONDS)),
            Some(Probe::http(health, deploy.port, READINESS_INITIAL_DELAY_SECONDS)),
        )
    } else {
        (None, None)
    };

    let mut annotations = BTreeMap::new();
    if metrics.enabled {
        annotations.insert("prometheus.io/scrape".to_string(), "true".to_string());
        annotations.insert("prometheus.io/port".to_string(), metrics.port.to_string());
        annotations.insert("prometheus.io/path".to_string(), metrics.path.clone());
    }

    let revision_history_limit = if deploy.rollback.enabled {
        deploy.rollback.revision_history
    } else {
        0
    };

    Resource {
        api_version: "apps/v1",
        kind: "Deployment",
        metadata: metadata(config, deploy.app_name.clone()),
        spec: DeploymentSpec {
            replicas: deploy.scaling.horizontal.min_replicas,
            revision_history_limit,
            selector: LabelSelector {
                match_labels: app_labels(config),
            },
            strategy: deploy.strategy.into(),
            template: PodTemplate {
                metadata: PodMetadata {
                    labels: app_labels(config),
                    annotations,
                },
                spec: PodSpec {
                    containers: vec![Container {
                        name: deploy.app_name.clone(),
                        image: deploy.image.clone(),
                        ports: vec![ContainerPort {
                            name: "http",
                            container_port: deploy.port,
                        }],
                        env: vec![
                            EnvVar {
                                name: "APP_ENV",
                                value: config.environment.name.clone(),
                            },
                            EnvVar {
                                name: "PORT",
                                value: deploy.port.to_string(),
                            },
                            EnvVar {
                                name: "LOG_LEVEL",
                                value: config.monitoring.logging.level.to_string(),
                            },
                        ],
                        resources: Resources::from_config(&deploy.scaling.vertical),
                        liveness_probe,
                        readiness_probe,
                    }],
                },
            },
        },
    }
}

fn service(config: &ConfigTree) -> Resource<ServiceSpec> {
    Resource {
        api_version: "v1",
        kind: "Service",
        metadata: metadata(config, config.deployment.app_name.clone()),
        spec: ServiceSpec {
            service_type: "ClusterIP",
            selector: app_labels(config),
            ports: vec![ServicePort {
                name: "http",
                protocol: "TCP",
                port: SERVICE_PORT,
                target_port: config.deployment.port,
            }],
        },
    }
}

fn autoscaler(config: &ConfigTree) -> Resource<AutoscalerSpec> {
    let horizontal = &config.deployment.scaling.horizontal;
    Resource {
        api_version: "autoscaling/v2",
        kind: "HorizontalPodAutoscaler",
        metadata: metadata(config, config.deployment.app_name.clone()),
        spec: AutoscalerSpec {
            scale_target_ref: ScaleTargetRef {
                api_version: "apps/v1",
                kind: "Deployment",
                name: config.deployment.app_name.clone(),
            },
            min_replicas: horizontal.min_replicas,
            max_replicas: horizontal.max_replicas,
            metrics: vec![MetricSpec {
                metric_type: "Resource",
                resource: ResourceMetric {
                    name: "cpu",
                    target: MetricTarget {
                        target_type: "Utilization",
                        average_utilization: horizontal.target_cpu_utilization,
                    },
                },
            }],
        },
    }
}

fn ingress(config: &ConfigTree) -> Resource<IngressSpec> {
    let app = &config.deployment.app_name;
    let domain = &config.environment.domain;
    Resource {
        api_version: "networking.k8s.io/v1",
        kind: "Ingress",
        metadata: metadata(config, app.clone()),
        spec: IngressSpec {
            ingress_class_name: "nginx",
            tls: vec![IngressTls {
                hosts: vec![domain.clone()],
                secret_name: format!("{}-tls", app),
            }],
            rules: vec![IngressRule {
                host: domain.clone(),
                http: IngressHttp {
                    paths: vec![IngressPath {
                        path: "/",
                        path_type: "Prefix",
                        backend: IngressBackend {
                            service: BackendService {
                                name: app.clone(),
                                port: BackendPort {
                                    number: SERVICE_PORT,
                                },
                            },
                        },
                    }],
                },
            }],
        },
    }
}

impl Renderer for KubernetesRenderer {
    fn render(&self, config: &ConfigTree) -> Result<String, DeployError> {
        let mut documents = vec![
            serde_yaml::to_string(&deployment(config))?,
            serde_yaml::to_string(&service(config))?,
        ];
        if config.deployment.scaling.horizontal.enabled {
            documents.push(serde_yaml::to_string(&autoscaler(config))?);
        }
        if config.security.tls.enabled {
            documents.push(serde_yaml::to_string(&ingress(config))?);
        }
        Ok(documents.join("---\n"))
    }
}
