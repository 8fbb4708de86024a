use anyhow::{Context, Result};

use super::{ChartInstaller, ChartRelease};
use crate::utils::{run_captured, run_inherited, tool_installed};

/// [`ChartInstaller`] backed by the `helm` CLI.
#[derive(Debug, Clone)]
pub struct Helm {
    kube_context: String,
}

impl Helm {
    pub fn new(kube_context: &str) -> Self {
        Self {
            kube_context: kube_context.to_string(),
        }
    }

    fn install_args(&self, chart: &ChartRelease) -> Vec<String> {
        // upgrade --install: re-running setup upgrades in place
        let mut args = vec![
            "upgrade".to_string(),
            "--install".to_string(),
            chart.release.clone(),
            chart.chart.clone(),
            "--kube-context".to_string(),
            self.kube_context.clone(),
            "--namespace".to_string(),
            chart.namespace.clone(),
        ];
        if let Some(version) = &chart.version {
            args.extend(["--version".to_string(), version.clone()]);
        }
        for (key, value) in &chart.values {
            args.extend(["--set".to_string(), format!("{key}={value}")]);
        }
        args
    }
}

impl ChartInstaller for Helm {
    fn available(&self) -> bool {
        tool_installed("helm")
    }

    fn add_repo(&self, name: &str, url: &str) -> Result<()> {
        // --force-update makes an existing repo entry a no-op
        run_captured("helm", ["repo", "add", name, url, "--force-update"])
            .with_context(|| format!("could not add helm repo {name}"))?;
        Ok(())
    }

    fn update_repos(&self) -> Result<()> {
        run_captured("helm", ["repo", "update"]).context("could not update helm repos")?;
        Ok(())
    }

    fn install_chart(&self, chart: &ChartRelease) -> Result<()> {
        run_inherited("helm", self.install_args(chart))
            .with_context(|| format!("could not install chart {}", chart.chart))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn install_args_include_version_and_values() {
        let helm = Helm::new("kind-demo");
        let chart = ChartRelease {
            release: "cilium".to_string(),
            chart: "cilium/cilium".to_string(),
            version: Some("1.14.5".to_string()),
            namespace: "kube-system".to_string(),
            values: vec![("k8sServicePort".to_string(), "6443".to_string())],
        };

        assert_eq!(
            helm.install_args(&chart),
            vec![
                "upgrade",
                "--install",
                "cilium",
                "cilium/cilium",
                "--kube-context",
                "kind-demo",
                "--namespace",
                "kube-system",
                "--version",
                "1.14.5",
                "--set",
                "k8sServicePort=6443",
            ]
        );
    }
}
