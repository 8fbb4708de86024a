// Capability interfaces over the external cluster tooling.
//
// Production code talks to kubectl, kind and helm through these traits; the
// tests swap in `FakeCluster` so deployment flows run without a cluster.

use anyhow::Result;
use k8s_openapi::api::core::v1::{Node, Pod};
use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;

pub mod fake;
pub mod helm;
pub mod kind;
pub mod kubectl;

pub use fake::FakeCluster;
pub use helm::Helm;
pub use kind::Kind;
pub use kubectl::Kubectl;

/// Something `kubectl apply -f` accepts: a file, a directory, or a URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestSource {
    Path(PathBuf),
    Url(String),
}

impl ManifestSource {
    pub fn as_arg(&self) -> String {
        match self {
            ManifestSource::Path(p) => p.to_string_lossy().into_owned(),
            ManifestSource::Url(u) => u.clone(),
        }
    }
}

impl fmt::Display for ManifestSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_arg())
    }
}

/// `kind/name`, optionally namespaced.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceRef {
    pub kind: String,
    pub name: String,
    pub namespace: Option<String>,
}

impl ResourceRef {
    pub fn new(kind: &str, name: &str) -> Self {
        Self {
            kind: kind.to_string(),
            name: name.to_string(),
            namespace: None,
        }
    }

    pub fn in_namespace(mut self, namespace: &str) -> Self {
        self.namespace = Some(namespace.to_string());
        self
    }

    /// Parse the `kind/name` shorthand used in the config file.
    pub fn parse(spec: &str, namespace: &str) -> Result<Self> {
        match spec.split_once('/') {
            Some((kind, name)) if !kind.is_empty() && !name.is_empty() => {
                Ok(Self::new(kind, name).in_namespace(namespace))
            }
            _ => anyhow::bail!("expected <kind>/<name>, got {spec:?}"),
        }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{} (namespace {ns})", self.kind, self.name),
            None => write!(f, "{}/{}", self.kind, self.name),
        }
    }
}

/// Label selector scoped to one namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Selector {
    pub namespace: String,
    pub label: String,
}

impl Selector {
    pub fn new(namespace: &str, label: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            label: label.to_string(),
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} in {}", self.label, self.namespace)
    }
}

/// Throwaway pod that runs a single command and is removed afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbePod {
    pub name: String,
    pub image: String,
    pub namespace: String,
    pub labels: Option<String>,
    pub command: Vec<String>,
}

pub trait ClusterControlPlane {
    fn apply_manifest(&self, source: &ManifestSource) -> Result<()>;

    /// Delete a single resource; a missing resource is not an error.
    fn delete_resource(&self, resource: &ResourceRef) -> Result<()>;

    /// Delete every resource of `kind` in `namespace`.
    fn delete_all(&self, kind: &str, namespace: &str) -> Result<()>;

    fn resource_exists(&self, resource: &ResourceRef) -> Result<bool>;

    fn ensure_namespace(&self, namespace: &str) -> Result<()>;

    /// One ready flag per pod matching `selector`.
    fn pod_readiness(&self, selector: &Selector) -> Result<Vec<bool>>;

    /// Phase of every pod matching `selector`.
    fn pod_phases(&self, selector: &Selector) -> Result<Vec<String>>;

    fn pod_names(&self, selector: &Selector) -> Result<Vec<String>>;

    /// One flag per node, from its `Ready` condition.
    fn node_readiness(&self) -> Result<Vec<bool>>;

    /// Run the probe to completion and return what it printed.
    fn run_probe(&self, probe: &ProbePod) -> Result<String>;

    /// Human-readable table of `kind` resources (`None` for all namespaces).
    fn show(&self, kind: &str, namespace: Option<&str>) -> Result<String>;
}

pub trait ClusterProvisioner {
    fn cluster_exists(&self) -> Result<bool>;

    fn create_cluster(&self, config_yaml: &str) -> Result<()>;

    fn delete_cluster(&self) -> Result<()>;

    fn load_image(&self, tag: &str) -> Result<()>;
}

pub trait ChartInstaller {
    fn available(&self) -> bool;

    fn add_repo(&self, name: &str, url: &str) -> Result<()>;

    fn update_repos(&self) -> Result<()>;

    fn install_chart(&self, chart: &ChartRelease) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartRelease {
    pub release: String,
    pub chart: String,
    pub version: Option<String>,
    pub namespace: String,
    pub values: Vec<(String, String)>,
}

/// The `items` of a `kubectl get -o json` listing.
///
/// kubectl reports these as a generic `List`, so the typed k8s-openapi list
/// wrapper (which insists on `PodList` etc.) cannot decode them.
#[derive(Debug, Deserialize)]
pub struct ItemList<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}

/// One flag per pod. A pod is ready once it reports container statuses,
/// every container is ready, and it is not being deleted.
pub fn pod_ready_flags(pods: &[Pod]) -> Vec<bool> {
    pods.iter()
        .map(|pod| {
            let statuses = pod
                .status
                .as_ref()
                .and_then(|s| s.container_statuses.as_deref())
                .unwrap_or_default();
            pod.metadata.deletion_timestamp.is_none()
                && !statuses.is_empty()
                && statuses.iter().all(|cs| cs.ready)
        })
        .collect()
}

pub fn pod_phases(pods: &[Pod]) -> Vec<String> {
    pods.iter()
        .map(|pod| {
            pod.status
                .as_ref()
                .and_then(|s| s.phase.clone())
                .unwrap_or_else(|| "Unknown".to_string())
        })
        .collect()
}

/// A node counts as ready only if its `Ready` condition is exactly `True`.
pub fn node_readiness(nodes: &[Node]) -> Vec<bool> {
    nodes
        .iter()
        .map(|node| {
            node.status
                .iter()
                .flat_map(|s| s.conditions.iter().flatten())
                .any(|c| c.type_ == "Ready" && c.status == "True")
        })
        .collect()
}

/// Readiness over a set of flags: at least one, and all of them true.
pub fn all_ready(flags: &[bool]) -> bool {
    !flags.is_empty() && flags.iter().all(|ready| *ready)
}
