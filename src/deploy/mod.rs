// Multi-step deployment flows. Each step that depends on the cluster
// settling goes through a `Gate`; the steps themselves only talk to the
// cluster through the capability traits in `crate::cluster`.

use anyhow::{bail, Context, Result};
use simplelog::*;
use std::fs;
use std::path::{Path, PathBuf};

use crate::builder;
use crate::cluster::{
    ChartInstaller, ChartRelease, ClusterControlPlane, ClusterProvisioner, ManifestSource,
    ResourceRef, Selector,
};
use crate::configparser::config::{
    AppConfig, CiliumConfig, ClusterConfig, GrafanaConfig, KindstackConfig,
};
use crate::grafana::{Datasource, DatasourceStatus, Grafana};
use crate::readiness::checks::{probe_client, HttpOk, NodesReady, PodsReady, PodsRunning};

pub mod gates;
pub mod templates;

use gates::{Gate, Gates};

/// The external tools a deployment drives.
pub struct Stack<'a> {
    pub plane: &'a dyn ClusterControlPlane,
    pub provisioner: &'a dyn ClusterProvisioner,
    pub charts: &'a dyn ChartInstaller,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetupOptions {
    pub cilium: bool,
    pub recreate: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeployOptions {
    pub build: bool,
    pub cilium: bool,
    pub monitoring: bool,
}

/// What is already present before a full-stack deploy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExistingSetup {
    pub cluster: bool,
    pub cilium: bool,
    pub monitoring: bool,
}

//
// cluster
//

/// kind config for the cluster: the configured file verbatim, or rendered
/// from the port mappings.
pub fn kind_config(cluster: &ClusterConfig, cilium: bool) -> Result<String> {
    match &cluster.kind_config {
        Some(path) => {
            if cilium {
                warn!("using {path:?} as-is; make sure it disables the default CNI for Cilium");
            }
            fs::read_to_string(path).with_context(|| format!("could not read kind config {path:?}"))
        }
        None => templates::render_kind_config(&cluster.name, cilium, &cluster.port_mappings),
    }
}

fn cilium_selector(cilium: &CiliumConfig) -> Selector {
    Selector::new(&cilium.namespace, &cilium.label)
}

pub fn cilium_installed(plane: &dyn ClusterControlPlane, cilium: &CiliumConfig) -> Result<bool> {
    Ok(!plane.pod_names(&cilium_selector(cilium))?.is_empty())
}

/// Create the kind cluster (unless it exists), optionally with Cilium, and
/// wait for the nodes to come up.
pub fn setup_cluster(
    stack: &Stack,
    config: &KindstackConfig,
    opts: SetupOptions,
    gates: &mut Gates,
) -> Result<()> {
    let name = &config.cluster.name;

    let mut exists = stack.provisioner.cluster_exists()?;
    if exists && opts.recreate {
        info!("deleting existing cluster {name}...");
        stack.provisioner.delete_cluster()?;
        exists = false;
    }

    // the default CNI and kube-proxy are baked in at creation time
    let cilium_missing = opts.cilium && exists && !cilium_installed(stack.plane, &config.cilium)?;
    if cilium_missing {
        bail!(
            "cluster {name} exists without Cilium and still runs the default CNI; \
             rerun cluster-setup with --cilium --recreate to replace it"
        );
    }

    if exists {
        info!("  <green>cluster {name} already exists</>");
    } else {
        info!("creating kind cluster {name}...");
        let kind_yaml = kind_config(&config.cluster, opts.cilium)?;
        trace!("kind config:\n{kind_yaml}");
        stack.provisioner.create_cluster(&kind_yaml)?;
        info!("  <green>cluster created</>");
    }

    // without the default CNI the nodes only turn Ready once Cilium runs
    if opts.cilium {
        if exists {
            info!("  <green>Cilium already installed</>");
        } else {
            install_cilium(stack, config, gates)?;
        }
    }

    gates.run(Gate::required(
        "cluster nodes",
        config.waits.nodes.to_config()?,
        NodesReady::new(stack.plane),
    ))?;

    Ok(())
}

/// Install Cilium with helm, or from the upstream manifest if helm is not
/// around. Install problems are reported but not fatal; the pod gate that
/// follows shows whether it came up.
pub fn install_cilium(stack: &Stack, config: &KindstackConfig, gates: &mut Gates) -> Result<()> {
    let cilium = &config.cilium;

    if stack.charts.available() {
        info!("installing Cilium {} with helm...", cilium.version);
        if let Err(e) = install_cilium_chart(stack.charts, cilium, &config.cluster.name) {
            warn!("<yellow>Cilium install may have issues, continuing:</> {e:#}");
        }
    } else {
        warn!("helm not found, installing Cilium with kubectl...");
        let manifest = ManifestSource::Url(cilium.fallback_manifest.clone());
        if let Err(e) = stack.plane.apply_manifest(&manifest) {
            warn!("<yellow>Cilium install may have issues, continuing:</> {e:#}");
        }
    }

    gates.run(Gate::advisory(
        "Cilium pods",
        config.waits.cilium.to_config()?,
        PodsRunning::new(stack.plane, cilium_selector(cilium)),
    ))?;

    Ok(())
}

fn install_cilium_chart(
    charts: &dyn ChartInstaller,
    cilium: &CiliumConfig,
    cluster_name: &str,
) -> Result<()> {
    charts.add_repo(&cilium.repo_name, &cilium.repo_url)?;
    charts.update_repos()?;

    let set = |key: &str, value: String| (key.to_string(), value);
    charts.install_chart(&ChartRelease {
        release: "cilium".to_string(),
        chart: cilium.chart.clone(),
        version: Some(cilium.version.clone()),
        namespace: cilium.namespace.clone(),
        values: vec![
            set("kubeProxyReplacement", "strict".to_string()),
            // kube-proxy is gone, so Cilium has to find the API server itself
            set("k8sServiceHost", format!("{cluster_name}-control-plane")),
            set("k8sServicePort", "6443".to_string()),
        ],
    })
}

//
// app
//

/// Manifests to apply for the app. The metrics-enabled deployment replaces
/// the plain one when it exists.
pub fn app_manifests(app: &AppConfig) -> Vec<PathBuf> {
    let mut manifests = app.manifests.clone();
    if app.metrics_manifest.is_file() {
        match manifests.first_mut() {
            Some(first) => *first = app.metrics_manifest.clone(),
            None => manifests.push(app.metrics_manifest.clone()),
        }
    }
    manifests
}

fn apply_file(plane: &dyn ClusterControlPlane, path: &Path) -> Result<()> {
    if !path.exists() {
        bail!("manifest {path:?} not found");
    }
    debug!("applying {path:?}");
    plane.apply_manifest(&ManifestSource::Path(path.to_path_buf()))
}

/// Apply the app manifests and wait for its pods.
pub fn deploy_app(stack: &Stack, config: &KindstackConfig, gates: &mut Gates) -> Result<()> {
    let app = &config.app;

    info!("deploying {}...", app.name);
    for manifest in app_manifests(app) {
        apply_file(stack.plane, &manifest)
            .with_context(|| format!("could not deploy {}", app.name))?;
    }
    info!("  <green>{} deployed</>", app.name);

    if app.servicemonitor.is_file() {
        match apply_file(stack.plane, &app.servicemonitor) {
            Ok(()) => info!("  <green>ServiceMonitor configured</>"),
            // needs the prometheus-operator CRDs, which plain prometheus lacks
            Err(e) => warn!("<yellow>could not apply ServiceMonitor:</> {e:#}"),
        }
    } else {
        warn!("{:?} not found, skipping ServiceMonitor", app.servicemonitor);
    }

    gates.run(Gate::required(
        &format!("{} pods", app.name),
        config.waits.pods.to_config()?,
        PodsReady::new(stack.plane, Selector::new(&app.namespace, &app.label)),
    ))?;

    Ok(())
}

//
// monitoring
//

pub fn monitoring_installed(plane: &dyn ClusterControlPlane, config: &KindstackConfig) -> Result<bool> {
    let monitoring = &config.monitoring;
    for component in monitoring.components.iter().filter(|c| c.name != config.app.name) {
        let selector = Selector::new(&monitoring.namespace, &component.label);
        if plane.pod_names(&selector)?.is_empty() {
            return Ok(false);
        }
    }
    Ok(true)
}

/// (Re)deploy every monitoring component in order, then check that the
/// exposed URLs answer.
pub fn deploy_monitoring(stack: &Stack, config: &KindstackConfig, gates: &mut Gates) -> Result<()> {
    let monitoring = &config.monitoring;
    let pods_wait = config.waits.pods.to_config()?;

    for component in &monitoring.components {
        info!("deploying {}...", component.name);

        for stale in &component.stale {
            let resource = ResourceRef::parse(stale, &monitoring.namespace)?;
            debug!("removing stale {resource}");
            stack.plane.delete_resource(&resource)?;
        }

        apply_file(stack.plane, &component.manifest)
            .with_context(|| format!("could not deploy {}", component.name))?;

        gates.run(Gate::new(
            &format!("{} pods", component.name),
            component.required,
            pods_wait,
            PodsReady::new(
                stack.plane,
                Selector::new(&monitoring.namespace, &component.label),
            ),
        ))?;
    }

    let http_wait = config.waits.http.to_config()?;
    let client = probe_client()?;
    for component in &monitoring.components {
        if let Some(url) = &component.url {
            gates.run(Gate::advisory(
                &format!("{} at {url}", component.name),
                http_wait,
                HttpOk::new(client.clone(), url),
            ))?;
        }
    }

    Ok(())
}

/// Register Prometheus as a Grafana datasource and, optionally, install the
/// app dashboard. Grafana being unreachable is only a warning.
pub fn configure_grafana(
    grafana: &Grafana,
    config: &KindstackConfig,
    dashboard: bool,
    gates: &mut Gates,
) -> Result<Option<String>> {
    let login = gates.run(Gate::advisory(
        "Grafana login",
        config.waits.http.to_config()?,
        grafana.login_ok(),
    ))?;
    if !login.is_ready() {
        warn!("<yellow>skipping Grafana setup, add the datasource by hand</>");
        return Ok(None);
    }

    let datasource = Datasource::prometheus(&config.monitoring.grafana.prometheus_url);
    match grafana.add_datasource(&datasource) {
        Ok(DatasourceStatus::Created) => info!("  <green>Prometheus datasource added</>"),
        Ok(DatasourceStatus::AlreadyExists) => {
            info!("  <green>Prometheus datasource already exists</>")
        }
        Err(e) => warn!("<yellow>could not add datasource, add it by hand:</> {e:#}"),
    }

    if !dashboard {
        return Ok(None);
    }
    create_dashboard(grafana, &config.monitoring.grafana).map(Some)
}

/// Create or overwrite the app dashboard, returning its URL.
pub fn create_dashboard(grafana: &Grafana, config: &GrafanaConfig) -> Result<String> {
    info!("creating dashboard {:?}...", config.dashboard_title);
    let payload = templates::render_dashboard(
        &config.dashboard_title,
        &config.dashboard_job,
        &["football-app", "nginx", "kubernetes"],
        None,
    )?;
    grafana
        .upsert_dashboard(payload)
        .context("could not create dashboard")
}

//
// full stack
//

pub fn existing_setup(stack: &Stack, config: &KindstackConfig) -> Result<ExistingSetup> {
    if !stack.provisioner.cluster_exists()? {
        return Ok(ExistingSetup::default());
    }
    Ok(ExistingSetup {
        cluster: true,
        cilium: cilium_installed(stack.plane, &config.cilium)?,
        monitoring: monitoring_installed(stack.plane, config)?,
    })
}

/// Provision whatever is missing, then build, load and deploy the app.
pub fn deploy_full_stack(
    stack: &Stack,
    config: &KindstackConfig,
    opts: DeployOptions,
    gates: &mut Gates,
) -> Result<()> {
    if opts.build {
        builder::check_context(&config.app)?;
    }

    let existing = existing_setup(stack, config)?;
    let mark = |present: bool| if present { "<green>present</>" } else { "<yellow>missing</>" };
    info!("current setup:");
    info!("  cluster:    {}", mark(existing.cluster));
    info!("  Cilium:     {}", mark(existing.cilium));
    info!("  monitoring: {}", mark(existing.monitoring));

    if !existing.cluster || (opts.cilium && !existing.cilium) {
        setup_cluster(
            stack,
            config,
            SetupOptions {
                cilium: opts.cilium,
                recreate: false,
            },
            gates,
        )?;
    }

    if opts.build {
        let tag = builder::build_app_image(&config.app)?;
        builder::load_into_cluster(stack.provisioner, &tag)?;
    } else {
        warn!("");
        warn!("Not building before deploying! are you sure this is a good idea?");
        warn!("");
    }

    deploy_app(stack, config, gates)?;

    if opts.monitoring {
        if existing.monitoring {
            info!("  <green>monitoring already deployed</>");
        } else {
            deploy_monitoring(stack, config, gates)?;
        }
    }

    Ok(())
}

/// Tables of what is running in the cluster.
pub fn cluster_status(plane: &dyn ClusterControlPlane, namespace: &str) -> Result<String> {
    let sections = [
        ("Deployments", "deployments", Some(namespace)),
        ("Pods", "pods", Some(namespace)),
        ("Services", "services", None),
        ("Network policies", "networkpolicies", Some(namespace)),
    ];

    let mut out = String::new();
    for (title, kind, ns) in sections {
        let table = plane
            .show(kind, ns)
            .with_context(|| format!("could not list {kind}"))?;
        out.push_str(&format!("{title}:\n{}\n", table.trim_end()));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::FakeCluster;
    use pretty_assertions::assert_eq;

    #[test]
    fn metrics_manifest_replaces_deployment() {
        let dir = tempfile::tempdir().unwrap();
        let metrics = dir.path().join("deployment-with-metrics.yaml");

        let mut app = AppConfig {
            metrics_manifest: metrics.clone(),
            ..Default::default()
        };
        assert_eq!(app_manifests(&app), app.manifests);

        fs::write(&metrics, "").unwrap();
        assert_eq!(
            app_manifests(&app),
            vec![metrics.clone(), PathBuf::from("k8s/service.yaml")]
        );

        app.manifests.clear();
        assert_eq!(app_manifests(&app), vec![metrics]);
    }

    #[test]
    fn cilium_chart_values() {
        let fake = FakeCluster::new().with_helm();
        install_cilium_chart(&fake, &CiliumConfig::default(), "demo").unwrap();

        assert_eq!(
            fake.journal(),
            vec![
                "helm-repo-add cilium",
                "helm-repo-update",
                "helm-install cilium cilium/cilium"
            ]
        );
    }

    #[test]
    fn status_lists_every_section() {
        let fake = FakeCluster::new();
        let status = cluster_status(&fake, "default").unwrap();

        for title in ["Deployments:", "Pods:", "Services:", "Network policies:"] {
            assert!(status.contains(title), "missing {title}");
        }
        assert!(status.contains("(fake networkpolicies)"));
    }

    #[test]
    fn custom_kind_config_used_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kind.yaml");
        fs::write(&path, "kind: Cluster\n").unwrap();

        let cluster = ClusterConfig {
            kind_config: Some(path),
            ..Default::default()
        };
        assert_eq!(kind_config(&cluster, false).unwrap(), "kind: Cluster\n");
    }
}
