// In-memory stand-in for kubectl/kind/helm.
//
// Query results are scripted per selector as a sequence of snapshots; each
// poll consumes one and the last snapshot sticks. Every mutating call is
// recorded in a journal so tests can assert on ordering.

use anyhow::{bail, Result};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};

use super::{
    ChartInstaller, ChartRelease, ClusterControlPlane, ClusterProvisioner, ManifestSource,
    ProbePod, ResourceRef, Selector,
};

#[derive(Debug, Default)]
pub struct FakeCluster {
    state: Mutex<FakeState>,
}

#[derive(Debug, Default)]
struct FakeState {
    journal: Vec<String>,
    failures: Vec<String>,
    cluster_exists: bool,
    helm_available: bool,
    resources: HashSet<String>,
    readiness: HashMap<Selector, VecDeque<Vec<bool>>>,
    phases: HashMap<Selector, VecDeque<Vec<String>>>,
    pods: HashMap<Selector, Vec<String>>,
    nodes: VecDeque<Vec<bool>>,
    probes: Vec<(String, String)>,
    polls: HashMap<Selector, usize>,
}

fn next_snapshot<T: Clone + Default>(queue: Option<&mut VecDeque<T>>) -> T {
    match queue {
        Some(q) if q.len() > 1 => q.pop_front().unwrap_or_default(),
        Some(q) => q.front().cloned().unwrap_or_default(),
        None => T::default(),
    }
}

fn resource_key(r: &ResourceRef) -> String {
    format!(
        "{}/{}@{}",
        r.kind,
        r.name,
        r.namespace.as_deref().unwrap_or("")
    )
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record `entry` in the journal, failing if a failure was injected for it.
    fn record(&self, entry: String) -> Result<()> {
        let mut state = self.state();
        state.journal.push(entry.clone());
        if state.failures.iter().any(|f| entry.starts_with(f)) {
            bail!("injected failure: {entry}");
        }
        Ok(())
    }

    pub fn with_cluster(self) -> Self {
        self.state().cluster_exists = true;
        self
    }

    pub fn with_helm(self) -> Self {
        self.state().helm_available = true;
        self
    }

    pub fn with_resource(self, resource: ResourceRef) -> Self {
        self.state().resources.insert(resource_key(&resource));
        self
    }

    pub fn with_pods(self, selector: Selector, names: &[&str]) -> Self {
        self.state()
            .pods
            .insert(selector, names.iter().map(|n| n.to_string()).collect());
        self
    }

    pub fn script_readiness(self, selector: Selector, snapshots: Vec<Vec<bool>>) -> Self {
        self.state().readiness.insert(selector, snapshots.into());
        self
    }

    pub fn script_phases(self, selector: Selector, snapshots: Vec<Vec<&str>>) -> Self {
        let snapshots = snapshots
            .into_iter()
            .map(|s| s.into_iter().map(String::from).collect())
            .collect();
        self.state().phases.insert(selector, snapshots);
        self
    }

    pub fn script_nodes(self, snapshots: Vec<Vec<bool>>) -> Self {
        self.state().nodes = snapshots.into();
        self
    }

    /// Output returned by any probe whose name starts with `name_prefix`.
    pub fn probe_output(self, name_prefix: &str, output: &str) -> Self {
        self.state()
            .probes
            .push((name_prefix.to_string(), output.to_string()));
        self
    }

    /// Make every operation whose journal entry starts with `prefix` fail.
    pub fn fail_on(self, prefix: &str) -> Self {
        self.state().failures.push(prefix.to_string());
        self
    }

    pub fn journal(&self) -> Vec<String> {
        self.state().journal.clone()
    }

    /// Number of readiness or phase queries made for `selector`.
    pub fn polls(&self, selector: &Selector) -> usize {
        self.state().polls.get(selector).copied().unwrap_or(0)
    }

    fn poll(&self, selector: &Selector, what: &str) -> Result<()> {
        {
            let mut state = self.state();
            *state.polls.entry(selector.clone()).or_default() += 1;
            if state
                .failures
                .iter()
                .any(|f| format!("{what} {}", selector.label).starts_with(f))
            {
                bail!("injected failure: {what} {}", selector.label);
            }
        }
        Ok(())
    }
}

impl ClusterControlPlane for FakeCluster {
    fn apply_manifest(&self, source: &ManifestSource) -> Result<()> {
        self.record(format!("apply {source}"))
    }

    fn delete_resource(&self, resource: &ResourceRef) -> Result<()> {
        self.record(format!("delete {}/{}", resource.kind, resource.name))?;
        self.state().resources.remove(&resource_key(resource));
        Ok(())
    }

    fn delete_all(&self, kind: &str, namespace: &str) -> Result<()> {
        self.record(format!("delete-all {kind} {namespace}"))
    }

    fn resource_exists(&self, resource: &ResourceRef) -> Result<bool> {
        Ok(self.state().resources.contains(&resource_key(resource)))
    }

    fn ensure_namespace(&self, namespace: &str) -> Result<()> {
        self.record(format!("ensure-namespace {namespace}"))?;
        let ns = ResourceRef::new("namespace", namespace);
        self.state().resources.insert(resource_key(&ns));
        Ok(())
    }

    fn pod_readiness(&self, selector: &Selector) -> Result<Vec<bool>> {
        self.poll(selector, "pod-readiness")?;
        Ok(next_snapshot(self.state().readiness.get_mut(selector)))
    }

    fn pod_phases(&self, selector: &Selector) -> Result<Vec<String>> {
        self.poll(selector, "pod-phases")?;
        Ok(next_snapshot(self.state().phases.get_mut(selector)))
    }

    fn pod_names(&self, selector: &Selector) -> Result<Vec<String>> {
        Ok(self.state().pods.get(selector).cloned().unwrap_or_default())
    }

    fn node_readiness(&self) -> Result<Vec<bool>> {
        Ok(next_snapshot(Some(&mut self.state().nodes)))
    }

    fn run_probe(&self, probe: &ProbePod) -> Result<String> {
        self.record(format!("probe {} {}", probe.name, probe.namespace))?;
        let state = self.state();
        let output = state
            .probes
            .iter()
            .find(|(prefix, _)| probe.name.starts_with(prefix.as_str()))
            .map(|(_, out)| out.clone());
        match output {
            Some(out) => Ok(out),
            None => bail!("no scripted output for probe {}", probe.name),
        }
    }

    fn show(&self, kind: &str, _namespace: Option<&str>) -> Result<String> {
        Ok(format!("NAME\n(fake {kind})\n"))
    }
}

impl ClusterProvisioner for FakeCluster {
    fn cluster_exists(&self) -> Result<bool> {
        Ok(self.state().cluster_exists)
    }

    fn create_cluster(&self, config_yaml: &str) -> Result<()> {
        self.record("create-cluster".to_string())?;
        let mut state = self.state();
        state.journal.push(format!("cluster-config {}", config_yaml.len()));
        state.cluster_exists = true;
        Ok(())
    }

    fn delete_cluster(&self) -> Result<()> {
        self.record("delete-cluster".to_string())?;
        self.state().cluster_exists = false;
        Ok(())
    }

    fn load_image(&self, tag: &str) -> Result<()> {
        self.record(format!("load-image {tag}"))
    }
}

impl ChartInstaller for FakeCluster {
    fn available(&self) -> bool {
        self.state().helm_available
    }

    fn add_repo(&self, name: &str, _url: &str) -> Result<()> {
        self.record(format!("helm-repo-add {name}"))
    }

    fn update_repos(&self) -> Result<()> {
        self.record("helm-repo-update".to_string())
    }

    fn install_chart(&self, chart: &ChartRelease) -> Result<()> {
        self.record(format!("helm-install {} {}", chart.release, chart.chart))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn last_snapshot_sticks() {
        let sel = Selector::new("default", "app=web");
        let fake = FakeCluster::new().script_readiness(
            sel.clone(),
            vec![vec![false], vec![true, true]],
        );

        assert_eq!(fake.pod_readiness(&sel).unwrap(), vec![false]);
        assert_eq!(fake.pod_readiness(&sel).unwrap(), vec![true, true]);
        assert_eq!(fake.pod_readiness(&sel).unwrap(), vec![true, true]);
        assert_eq!(fake.polls(&sel), 3);
    }

    #[test]
    fn injected_failures_are_journaled() {
        let fake = FakeCluster::new().fail_on("apply k8s/service");

        assert!(fake
            .apply_manifest(&ManifestSource::Path("k8s/deployment.yaml".into()))
            .is_ok());
        assert!(fake
            .apply_manifest(&ManifestSource::Path("k8s/service.yaml".into()))
            .is_err());
        assert_eq!(
            fake.journal(),
            vec!["apply k8s/deployment.yaml", "apply k8s/service.yaml"]
        );
    }
}
