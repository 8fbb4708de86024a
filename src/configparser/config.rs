use anyhow::{Context, Result};
use fully_pub::fully_pub;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use simplelog::*;
use std::path::{Path, PathBuf};

use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;

use crate::readiness::WaitConfig;

pub const DEFAULT_CONFIG_FILE: &str = "kindstack.yaml";

/// Layer built-in defaults, the yaml file at `path` (if present), and
/// `KINDSTACK_`-prefixed environment variables, in that order.
pub fn parse(path: &Path) -> Result<KindstackConfig> {
    debug!("trying to parse {path:?}");

    // "__" separates nesting levels so keys like local_port survive intact,
    // e.g. KINDSTACK_CLUSTER__NAME=demo
    let env_overrides = Env::prefixed("KINDSTACK_").split("__");
    trace!(
        "overriding config with envvar values: {}",
        env_overrides
            .iter()
            .map(|(key, val)| format!("{}='{}'", key.string, val))
            .join(", ")
    );

    let config: KindstackConfig = Figment::from(Serialized::defaults(KindstackConfig::default()))
        .merge(Yaml::file(path))
        .merge(env_overrides)
        .extract()
        .with_context(|| format!("failed to parse {}", path.display()))?;

    trace!("got config: {config:#?}");

    Ok(config)
}

//
// ==== Structs for kindstack.yaml parsing ====
//

#[derive(Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
#[fully_pub]
struct KindstackConfig {
    cluster: ClusterConfig,
    app: AppConfig,
    cilium: CiliumConfig,
    monitoring: MonitoringConfig,
    policies: PolicyConfig,
    port_forwards: Vec<PortForwardConfig>,
    waits: Waits,
}

impl Default for KindstackConfig {
    fn default() -> Self {
        let forward = |name: &str, service: &str, local_port, remote_port| PortForwardConfig {
            name: name.to_string(),
            service: service.to_string(),
            namespace: default_namespace(),
            local_port,
            remote_port,
        };

        Self {
            cluster: ClusterConfig::default(),
            app: AppConfig::default(),
            cilium: CiliumConfig::default(),
            monitoring: MonitoringConfig::default(),
            policies: PolicyConfig::default(),
            port_forwards: vec![
                forward("Football App", "football-intro-app-service", 8080, 80),
                forward("Prometheus", "prometheus", 9090, 9090),
                forward("Grafana", "grafana", 3000, 3000),
            ],
            waits: Waits::default(),
        }
    }
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
#[fully_pub]
struct ClusterConfig {
    name: String,
    /// Use this kind config file verbatim instead of rendering one.
    kind_config: Option<PathBuf>,
    port_mappings: Vec<PortMapping>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            name: "football-app-cluster".to_string(),
            kind_config: None,
            port_mappings: vec![
                PortMapping::new(30080, 8080),
                PortMapping::new(30090, 30090),
                PortMapping::new(30030, 30030),
                PortMapping::new(30113, 30113),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[fully_pub]
struct PortMapping {
    container_port: u16,
    host_port: u16,
}

impl PortMapping {
    pub fn new(container_port: u16, host_port: u16) -> Self {
        Self {
            container_port,
            host_port,
        }
    }
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
#[fully_pub]
struct AppConfig {
    name: String,
    image: String,
    namespace: String,
    label: String,
    service: String,
    context: PathBuf,
    dockerfile: PathBuf,
    /// Preferred over `dockerfile` when it exists.
    metrics_dockerfile: PathBuf,
    manifests: Vec<PathBuf>,
    /// Replaces the first entry of `manifests` when it exists.
    metrics_manifest: PathBuf,
    servicemonitor: PathBuf,
    url: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: "football-intro-app".to_string(),
            image: "football-intro-app:local".to_string(),
            namespace: "default".to_string(),
            label: "app=football-intro-app".to_string(),
            service: "football-intro-app-service".to_string(),
            context: PathBuf::from("."),
            dockerfile: PathBuf::from("Dockerfile"),
            metrics_dockerfile: PathBuf::from("Dockerfile.metrics"),
            manifests: vec![
                PathBuf::from("k8s/deployment.yaml"),
                PathBuf::from("k8s/service.yaml"),
            ],
            metrics_manifest: PathBuf::from("k8s/deployment-with-metrics.yaml"),
            servicemonitor: PathBuf::from("monitoring/servicemonitor.yaml"),
            url: "http://localhost:8080".to_string(),
        }
    }
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
#[fully_pub]
struct CiliumConfig {
    version: String,
    repo_name: String,
    repo_url: String,
    chart: String,
    namespace: String,
    label: String,
    /// Applied with kubectl when helm is not installed.
    fallback_manifest: String,
}

impl Default for CiliumConfig {
    fn default() -> Self {
        Self {
            version: "1.14.5".to_string(),
            repo_name: "cilium".to_string(),
            repo_url: "https://helm.cilium.io/".to_string(),
            chart: "cilium/cilium".to_string(),
            namespace: "kube-system".to_string(),
            label: "k8s-app=cilium".to_string(),
            fallback_manifest:
                "https://raw.githubusercontent.com/cilium/cilium/v1.14.5/install/kubernetes/quick-install.yaml"
                    .to_string(),
        }
    }
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
#[fully_pub]
struct MonitoringConfig {
    namespace: String,
    components: Vec<MonitoringComponent>,
    grafana: GrafanaConfig,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        let component = |name: &str, manifest: &str, stale: &[&str], url: &str| MonitoringComponent {
            name: name.to_string(),
            label: format!("app={name}"),
            manifest: PathBuf::from(manifest),
            stale: stale.iter().map(|s| s.to_string()).collect(),
            url: Some(url.to_string()),
            required: true,
        };

        Self {
            namespace: "default".to_string(),
            components: vec![
                component(
                    "football-intro-app",
                    "k8s/nginx-exporter.yaml",
                    &[
                        "configmap/nginx-config",
                        "deployment/football-intro-app",
                        "service/football-intro-app-service",
                    ],
                    "http://localhost:8080",
                ),
                component(
                    "prometheus",
                    "k8s/prometheus-deployment.yaml",
                    &[
                        "deployment/prometheus",
                        "service/prometheus",
                        "configmap/prometheus-config",
                    ],
                    "http://localhost:30090",
                ),
                component(
                    "grafana",
                    "k8s/grafana-deployment.yaml",
                    &[
                        "deployment/grafana",
                        "service/grafana",
                        "configmap/grafana-datasources",
                    ],
                    "http://localhost:30030",
                ),
            ],
            grafana: GrafanaConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[fully_pub]
struct MonitoringComponent {
    name: String,
    label: String,
    manifest: PathBuf,
    /// `kind/name` resources removed before the manifest is re-applied.
    #[serde(default)]
    stale: Vec<String>,
    /// Checked for HTTP 200 once the pods are ready.
    #[serde(default)]
    url: Option<String>,
    #[serde(default = "default_true")]
    required: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
#[fully_pub]
struct GrafanaConfig {
    url: String,
    user: String,
    pass: String,
    /// Prometheus address as seen from inside the Grafana pod.
    prometheus_url: String,
    dashboard_title: String,
    /// Prometheus scrape job the dashboard panels query.
    dashboard_job: String,
}

impl Default for GrafanaConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:30030".to_string(),
            user: "admin".to_string(),
            pass: "admin".to_string(),
            prometheus_url: "http://prometheus:9090".to_string(),
            dashboard_title: "Football Introduction App Metrics".to_string(),
            dashboard_job: "football-app".to_string(),
        }
    }
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
#[fully_pub]
struct PolicyConfig {
    directory: PathBuf,
    deny_all: String,
    allow: String,
    cilium_l7: String,
    probe_image: String,
    probe_namespace: String,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("network-policies"),
            deny_all: "01-deny-all.yaml".to_string(),
            allow: "02-allow-football-app.yaml".to_string(),
            cilium_l7: "03-cilium-l7-policy.yaml".to_string(),
            probe_image: "nicolaka/netshoot".to_string(),
            probe_namespace: "test-ns".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[fully_pub]
struct PortForwardConfig {
    name: String,
    service: String,
    #[serde(default = "default_namespace")]
    namespace: String,
    local_port: u16,
    remote_port: u16,
}

fn default_namespace() -> String {
    "default".to_string()
}

impl PortForwardConfig {
    pub fn url(&self) -> String {
        format!("http://localhost:{}", self.local_port)
    }
}

/// Polling settings, in whole seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[fully_pub]
struct WaitSettings {
    interval: u64,
    timeout: u64,
}

impl WaitSettings {
    pub fn to_config(self) -> Result<WaitConfig> {
        Ok(WaitConfig::from_secs(self.interval, self.timeout)?)
    }
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
#[fully_pub]
struct Waits {
    nodes: WaitSettings,
    pods: WaitSettings,
    cilium: WaitSettings,
    http: WaitSettings,
}

impl Default for Waits {
    fn default() -> Self {
        Self {
            nodes: WaitSettings {
                interval: 5,
                timeout: 300,
            },
            pods: WaitSettings {
                interval: 5,
                timeout: 120,
            },
            cilium: WaitSettings {
                interval: 10,
                timeout: 300,
            },
            http: WaitSettings {
                interval: 1,
                timeout: 30,
            },
        }
    }
}
