use anyhow::{Context, Result};
use std::io::Write;
use tempfile::Builder;

use super::ClusterProvisioner;
use crate::utils::{run_captured, run_inherited};

/// [`ClusterProvisioner`] for a local kind cluster.
#[derive(Debug, Clone)]
pub struct Kind {
    name: String,
}

impl Kind {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Kubeconfig context kind registers for this cluster.
    pub fn context(&self) -> String {
        format!("kind-{}", self.name)
    }
}

/// Whether `name` is one of the lines printed by `kind get clusters`.
pub fn cluster_listed(output: &str, name: &str) -> bool {
    output.lines().any(|line| line.trim() == name)
}

impl ClusterProvisioner for Kind {
    fn cluster_exists(&self) -> Result<bool> {
        let out = run_captured("kind", ["get", "clusters"])?;
        Ok(cluster_listed(&out, &self.name))
    }

    fn create_cluster(&self, config_yaml: &str) -> Result<()> {
        // kind only reads cluster config from a file
        let mut config = Builder::new()
            .prefix("kind-config-")
            .suffix(".yaml")
            .tempfile()
            .context("could not create temporary kind config")?;
        config.write_all(config_yaml.as_bytes())?;
        config.flush()?;

        run_inherited(
            "kind",
            [
                "create".into(),
                "cluster".into(),
                "--name".into(),
                self.name.clone().into(),
                "--config".into(),
                config.path().as_os_str().to_owned(),
            ],
        )
        .with_context(|| format!("could not create kind cluster {}", self.name))
    }

    fn delete_cluster(&self) -> Result<()> {
        run_captured("kind", ["delete", "cluster", "--name", self.name.as_str()])
            .with_context(|| format!("could not delete kind cluster {}", self.name))?;
        Ok(())
    }

    fn load_image(&self, tag: &str) -> Result<()> {
        run_inherited("kind", ["load", "docker-image", tag, "--name", self.name.as_str()])
            .with_context(|| format!("could not load image {tag} into cluster {}", self.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cluster_match_is_whole_line() {
        let out = "football-app-cluster-old\nkind\n";
        assert!(!cluster_listed(out, "football-app-cluster"));
        assert!(cluster_listed(out, "kind"));
        assert!(cluster_listed("football-app-cluster\n", "football-app-cluster"));
    }

    #[test]
    fn context_name() {
        assert_eq!(Kind::new("demo").context(), "kind-demo");
    }
}
