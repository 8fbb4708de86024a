// Build the app image and get it into the kind cluster.

use anyhow::{Context, Result};
use simplelog::*;
use std::path::{Path, PathBuf};

use crate::cluster::ClusterProvisioner;
use crate::configparser::config::AppConfig;

pub mod docker;

/// Dockerfile to build with, relative to the build context. The metrics
/// variant wins when it exists.
pub fn pick_dockerfile(app: &AppConfig) -> PathBuf {
    if app.context.join(&app.metrics_dockerfile).is_file() {
        debug!("using {:?} for metrics support", app.metrics_dockerfile);
        app.metrics_dockerfile.clone()
    } else {
        app.dockerfile.clone()
    }
}

/// Build the app image, returning its tag.
pub fn build_app_image(app: &AppConfig) -> Result<String> {
    let dockerfile = pick_dockerfile(app);
    info!("building image {} from {:?}", app.image, dockerfile);

    docker::build_image(&app.context, &dockerfile, &app.image)
        .with_context(|| format!("could not build image {}", app.image))
}

/// Side-load an already built image into the cluster nodes.
pub fn load_into_cluster(provisioner: &dyn ClusterProvisioner, tag: &str) -> Result<()> {
    info!("loading image {tag} into cluster...");
    provisioner.load_image(tag)
}

/// Does the build context have what it needs to build `app`?
pub fn check_context(app: &AppConfig) -> Result<()> {
    let dockerfile = app.context.join(pick_dockerfile(app));
    if !Path::new(&dockerfile).is_file() {
        anyhow::bail!("no Dockerfile at {dockerfile:?}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::FakeCluster;
    use pretty_assertions::assert_eq;
    use std::fs;

    fn app_in(dir: &Path) -> AppConfig {
        AppConfig {
            context: dir.to_path_buf(),
            ..Default::default()
        }
    }

    #[test]
    fn metrics_dockerfile_preferred() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Dockerfile"), "FROM nginx").unwrap();
        let app = app_in(dir.path());

        assert_eq!(pick_dockerfile(&app), PathBuf::from("Dockerfile"));
        assert!(check_context(&app).is_ok());

        fs::write(dir.path().join("Dockerfile.metrics"), "FROM nginx").unwrap();
        assert_eq!(pick_dockerfile(&app), PathBuf::from("Dockerfile.metrics"));
    }

    #[test]
    fn missing_dockerfile_fails_check() {
        let dir = tempfile::tempdir().unwrap();
        assert!(check_context(&app_in(dir.path())).is_err());
    }

    #[test]
    fn image_is_loaded_by_tag() {
        let fake = FakeCluster::new();
        load_into_cluster(&fake, "football-intro-app:local").unwrap();
        assert_eq!(fake.journal(), vec!["load-image football-intro-app:local"]);
    }
}
