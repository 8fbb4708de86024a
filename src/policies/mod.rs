// Network policy management and the connectivity probes that check them.

use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use simplelog::*;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::cluster::{ClusterControlPlane, ManifestSource, ProbePod, ResourceRef, Selector};
use crate::configparser::config::{AppConfig, PolicyConfig};

/// Policy kinds removed by [`PolicyAction::Remove`].
pub const POLICY_KINDS: &[&str] = &["networkpolicies", "ciliumnetworkpolicies"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PolicyAction {
    /// Apply every policy file in the directory
    All,
    /// Apply only the deny-all baseline
    DenyAll,
    /// Apply only the app allow policy
    Allow,
    /// Apply only the Cilium L7 policy
    CiliumL7,
    /// Delete all network policies
    Remove,
}

/// Sorted `*.yaml` files in `dir`. A missing directory is created so the
/// operator has somewhere to put policies, but still counts as an error.
pub fn policy_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        fs::create_dir_all(dir).with_context(|| format!("could not create {dir:?}"))?;
        bail!("policy directory {dir:?} did not exist; created it, add policy files and rerun");
    }

    let pattern = dir.join("*.yaml");
    let mut files = glob::glob(&pattern.to_string_lossy())
        .with_context(|| format!("bad policy glob {pattern:?}"))?
        .collect::<Result<Vec<_>, _>>()?;
    files.sort();

    if files.is_empty() {
        bail!("no policy files found in {dir:?}");
    }
    Ok(files)
}

/// Apply or remove policies in `namespace` according to `action`.
pub fn apply_action(
    plane: &dyn ClusterControlPlane,
    config: &PolicyConfig,
    namespace: &str,
    action: PolicyAction,
) -> Result<()> {
    let files = policy_files(&config.directory)?;
    for f in &files {
        debug!("found policy {f:?}");
    }

    let single = |name: &str| -> Result<()> {
        let path = config.directory.join(name);
        if !path.is_file() {
            bail!("policy file {path:?} not found");
        }
        plane.apply_manifest(&ManifestSource::Path(path))
    };

    match action {
        PolicyAction::All => {
            info!("applying all network policies...");
            plane.apply_manifest(&ManifestSource::Path(config.directory.clone()))?;
        }
        PolicyAction::DenyAll => {
            info!("applying deny-all policy...");
            single(&config.deny_all)?;
            warn!("<yellow>all traffic is now blocked, apply allow policies to open it up</>");
        }
        PolicyAction::Allow => {
            info!("applying allow policies...");
            single(&config.allow)?;
        }
        PolicyAction::CiliumL7 => {
            info!("applying Cilium L7 policies...");
            single(&config.cilium_l7)?;
        }
        PolicyAction::Remove => {
            info!("removing all network policies...");
            for kind in POLICY_KINDS {
                // the cilium CRD is absent on clusters without Cilium
                if let Err(e) = plane.delete_all(kind, namespace) {
                    warn!("could not remove {kind}: {e:#}");
                }
            }
        }
    }

    info!("  <green>done</>");
    Ok(())
}

/// Text listing of the active policies. Kinds the cluster does not know
/// about are skipped with a warning.
pub fn show_policies(plane: &dyn ClusterControlPlane, namespace: &str) -> String {
    POLICY_KINDS
        .iter()
        .filter_map(|kind| match plane.show(kind, Some(namespace)) {
            Ok(table) => Some(format!("{kind}:\n{table}")),
            Err(e) => {
                warn!("could not list {kind}: {e:#}");
                None
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

//
// connectivity probes
//

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expectation {
    Reachable,
    Blocked,
}

impl fmt::Display for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expectation::Reachable => f.write_str("reachable"),
            Expectation::Blocked => f.write_str("blocked"),
        }
    }
}

/// What a probe pod saw when it tried to reach the app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeVerdict {
    /// Got a 2xx/3xx answer.
    Reachable(u16),
    /// Timed out, was refused, or got an error status (Cilium L7 denials are
    /// a 403).
    Blocked(String),
}

impl ProbeVerdict {
    /// Parse the output of `curl -w '%{http_code}'`, which prints `000` when
    /// no connection was made.
    pub fn from_output(output: &str) -> Self {
        let code = output.lines().find_map(|line| {
            let line = line.trim();
            line.get(..3)
                .filter(|c| c.bytes().all(|b| b.is_ascii_digit()))
                .and_then(|c| c.parse::<u16>().ok())
        });

        match code {
            Some(code) if (200..400).contains(&code) => ProbeVerdict::Reachable(code),
            Some(0) | None => ProbeVerdict::Blocked("no connection".to_string()),
            Some(code) => ProbeVerdict::Blocked(format!("HTTP {code}")),
        }
    }

    pub fn matches(&self, expect: Expectation) -> bool {
        matches!(
            (self, expect),
            (ProbeVerdict::Reachable(_), Expectation::Reachable)
                | (ProbeVerdict::Blocked(_), Expectation::Blocked)
        )
    }
}

impl fmt::Display for ProbeVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeVerdict::Reachable(code) => write!(f, "reachable (HTTP {code})"),
            ProbeVerdict::Blocked(why) => write!(f, "blocked ({why})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeSpec {
    pub name: String,
    pub namespace: String,
    pub labels: Option<String>,
    pub url: String,
    pub expect: Expectation,
}

impl ProbeSpec {
    /// Pod that curls the target once. Pod names get a random suffix so a
    /// leftover pod from an interrupted run does not collide.
    pub fn pod(&self, image: &str) -> ProbePod {
        ProbePod {
            name: format!("test-{}-{:04x}", self.name, fastrand::u16(..)),
            image: image.to_string(),
            namespace: self.namespace.clone(),
            labels: self.labels.clone(),
            command: vec![
                "/bin/bash".to_string(),
                "-c".to_string(),
                format!(
                    "curl -s -o /dev/null -w '%{{http_code}}' {} --connect-timeout 5 || echo 'Connection failed'",
                    self.url
                ),
            ],
        }
    }
}

/// The standard three probes: a plain pod in the app namespace, a pod
/// labelled `role=blocked`, and a pod in a separate namespace.
pub fn probe_plan(policies: &PolicyConfig, app: &AppConfig) -> Vec<ProbeSpec> {
    vec![
        ProbeSpec {
            name: "allowed".to_string(),
            namespace: app.namespace.clone(),
            labels: None,
            url: format!("http://{}", app.service),
            expect: Expectation::Reachable,
        },
        ProbeSpec {
            name: "blocked".to_string(),
            namespace: app.namespace.clone(),
            labels: Some("role=blocked".to_string()),
            url: format!("http://{}", app.service),
            expect: Expectation::Blocked,
        },
        ProbeSpec {
            name: "cross-namespace".to_string(),
            namespace: policies.probe_namespace.clone(),
            labels: None,
            url: format!(
                "http://{}.{}.svc.cluster.local",
                app.service, app.namespace
            ),
            expect: Expectation::Blocked,
        },
    ]
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub name: String,
    pub expect: Expectation,
    pub verdict: ProbeVerdict,
}

impl ProbeResult {
    pub fn passed(&self) -> bool {
        self.verdict.matches(self.expect)
    }
}

/// Run every probe in `plan` against the deployed app.
///
/// Probe pods, and the probe namespace if this run created it, are removed
/// afterwards whether or not the probes succeeded.
pub fn run_probes(
    plane: &dyn ClusterControlPlane,
    policies: &PolicyConfig,
    app: &AppConfig,
    plan: &[ProbeSpec],
) -> Result<Vec<ProbeResult>> {
    let app_pods = plane.pod_names(&Selector::new(&app.namespace, &app.label))?;
    let Some(app_pod) = app_pods.first() else {
        bail!(
            "no pods found for {} in {}, deploy the app first",
            app.label,
            app.namespace
        );
    };
    info!("  <green>found app pod {app_pod}</>");

    let probe_ns = ResourceRef::new("namespace", &policies.probe_namespace);
    let needs_ns = plan.iter().any(|p| p.namespace != app.namespace);
    let created_ns = needs_ns && !plane.resource_exists(&probe_ns)?;

    let mut spawned = vec![];
    let results = run_plan(plane, policies, app, plan, &mut spawned);

    info!("cleaning up probe resources...");
    for pod in &spawned {
        let pod_ref = ResourceRef::new("pod", &pod.name).in_namespace(&pod.namespace);
        if let Err(e) = plane.delete_resource(&pod_ref) {
            warn!("could not delete {pod_ref}: {e:#}");
        }
    }
    if created_ns {
        if let Err(e) = plane.delete_resource(&probe_ns) {
            warn!("could not delete {probe_ns}: {e:#}");
        }
    }

    results
}

fn run_plan(
    plane: &dyn ClusterControlPlane,
    policies: &PolicyConfig,
    app: &AppConfig,
    plan: &[ProbeSpec],
    spawned: &mut Vec<ProbePod>,
) -> Result<Vec<ProbeResult>> {
    if plan.iter().any(|p| p.namespace != app.namespace) {
        plane.ensure_namespace(&policies.probe_namespace)?;
    }

    plan.iter()
        .map(|spec| {
            info!(
                "probing {} from {} pod (expect {})...",
                spec.url, spec.name, spec.expect
            );
            let pod = spec.pod(&policies.probe_image);
            spawned.push(pod.clone());

            let output = plane
                .run_probe(&pod)
                .with_context(|| format!("could not run probe pod {}", pod.name))?;
            trace!("probe {} output: {output}", pod.name);

            let result = ProbeResult {
                name: spec.name.clone(),
                expect: spec.expect,
                verdict: ProbeVerdict::from_output(&output),
            };
            if result.passed() {
                info!("  <green>{}: {}</>", result.name, result.verdict);
            } else {
                error!(
                    "  <red>{}: {}, expected {}</>",
                    result.name, result.verdict, result.expect
                );
            }
            Ok(result)
        })
        .collect()
}
