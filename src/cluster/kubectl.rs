use anyhow::{Context, Result};
use duct::cmd;
use k8s_openapi::api::core::v1::{Node, Pod};
use k8s_openapi::serde_json;
use simplelog::*;
use std::ffi::OsString;

use super::{
    node_readiness, pod_phases, pod_ready_flags, ClusterControlPlane, ItemList, ManifestSource,
    ProbePod, ResourceRef, Selector,
};
use crate::utils::run_captured;

/// [`ClusterControlPlane`] backed by the `kubectl` binary.
#[derive(Debug, Clone)]
pub struct Kubectl {
    context: String,
}

impl Kubectl {
    /// Talk to the cluster through an explicit kubeconfig context rather
    /// than whatever happens to be current.
    pub fn new(context: &str) -> Self {
        Self {
            context: context.to_string(),
        }
    }

    fn args<'a>(&self, args: impl IntoIterator<Item = &'a str>) -> Vec<OsString> {
        let mut full: Vec<OsString> = vec!["--context".into(), (&self.context).into()];
        full.extend(args.into_iter().map(OsString::from));
        full
    }

    /// Run kubectl and return stdout, failing with stderr on non-zero exit.
    fn run<'a>(&self, args: impl IntoIterator<Item = &'a str>) -> Result<String> {
        run_captured("kubectl", self.args(args))
    }

    fn get_json<T>(&self, args: &[&str]) -> Result<ItemList<T>>
    where
        T: serde::de::DeserializeOwned,
    {
        let out = self.run(args.iter().copied().chain(["-o", "json"]))?;
        serde_json::from_str(&out).context("could not decode kubectl json output")
    }

    fn pods(&self, selector: &Selector) -> Result<Vec<Pod>> {
        let list = self.get_json(&[
            "get",
            "pods",
            "-l",
            selector.label.as_str(),
            "-n",
            selector.namespace.as_str(),
        ])?;
        Ok(list.items)
    }

    /// Start `kubectl port-forward` in the background. The child keeps
    /// running until the returned handle is killed.
    pub fn port_forward(
        &self,
        namespace: &str,
        service: &str,
        local_port: u16,
        remote_port: u16,
    ) -> Result<duct::Handle> {
        let target = format!("service/{service}");
        let ports = format!("{local_port}:{remote_port}");
        let args = self.args(["port-forward", "-n", namespace, target.as_str(), ports.as_str()]);
        debug!("starting kubectl port-forward {target} {ports}");

        cmd("kubectl", &args)
            .stdout_null()
            .stderr_null()
            .start()
            .with_context(|| format!("could not start port-forward for {target}"))
    }
}

impl ClusterControlPlane for Kubectl {
    fn apply_manifest(&self, source: &ManifestSource) -> Result<()> {
        let arg = source.as_arg();
        self.run(["apply", "-f", arg.as_str()])
            .with_context(|| format!("could not apply {source}"))?;
        Ok(())
    }

    fn delete_resource(&self, resource: &ResourceRef) -> Result<()> {
        let target = format!("{}/{}", resource.kind, resource.name);
        let mut args = vec!["delete", target.as_str(), "--ignore-not-found=true"];
        if let Some(ns) = &resource.namespace {
            args.extend(["-n", ns.as_str()]);
        }
        self.run(args)
            .with_context(|| format!("could not delete {resource}"))?;
        Ok(())
    }

    fn delete_all(&self, kind: &str, namespace: &str) -> Result<()> {
        self.run(["delete", kind, "--all", "-n", namespace])
            .with_context(|| format!("could not delete {kind} in {namespace}"))?;
        Ok(())
    }

    fn resource_exists(&self, resource: &ResourceRef) -> Result<bool> {
        let target = format!("{}/{}", resource.kind, resource.name);
        let mut args = vec!["get", target.as_str(), "--ignore-not-found=true", "-o", "name"];
        if let Some(ns) = &resource.namespace {
            args.extend(["-n", ns.as_str()]);
        }
        // --ignore-not-found prints nothing for a missing resource
        Ok(!self.run(args)?.trim().is_empty())
    }

    fn ensure_namespace(&self, namespace: &str) -> Result<()> {
        let ns = ResourceRef::new("namespace", namespace);
        if !self.resource_exists(&ns)? {
            self.run(["create", "namespace", namespace])
                .with_context(|| format!("could not create namespace {namespace}"))?;
        }
        Ok(())
    }

    fn pod_readiness(&self, selector: &Selector) -> Result<Vec<bool>> {
        Ok(pod_ready_flags(&self.pods(selector)?))
    }

    fn pod_phases(&self, selector: &Selector) -> Result<Vec<String>> {
        Ok(pod_phases(&self.pods(selector)?))
    }

    fn pod_names(&self, selector: &Selector) -> Result<Vec<String>> {
        Ok(self
            .pods(selector)?
            .into_iter()
            .filter_map(|p| p.metadata.name)
            .collect())
    }

    fn node_readiness(&self) -> Result<Vec<bool>> {
        let nodes: ItemList<Node> = self.get_json(&["get", "nodes"])?;
        Ok(node_readiness(&nodes.items))
    }

    fn run_probe(&self, probe: &ProbePod) -> Result<String> {
        let image = format!("--image={}", probe.image);
        let labels = probe.labels.as_ref().map(|l| format!("--labels={l}"));
        let mut args = vec![
            "run",
            probe.name.as_str(),
            image.as_str(),
            "--restart=Never",
            "--rm",
            "-i",
            "-n",
            probe.namespace.as_str(),
        ];
        if let Some(l) = &labels {
            args.push(l.as_str());
        }
        args.push("--");
        args.extend(probe.command.iter().map(String::as_str));

        self.run(args)
            .with_context(|| format!("probe pod {} failed", probe.name))
    }

    fn show(&self, kind: &str, namespace: Option<&str>) -> Result<String> {
        match namespace {
            Some(ns) => self.run(["get", kind, "-n", ns]),
            None => self.run(["get", kind, "--all-namespaces"]),
        }
    }
}
