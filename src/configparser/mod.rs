pub mod config;

use anyhow::{Context, Result};
use simplelog::*;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

pub use config::{KindstackConfig, DEFAULT_CONFIG_FILE};

static CONFIG_PATH: OnceLock<PathBuf> = OnceLock::new();
pub static CONFIG: OnceLock<config::KindstackConfig> = OnceLock::new();
// type alias for above's lifetime
pub type Config = &'static config::KindstackConfig;

/// Point the loader at a config file other than `kindstack.yaml`. Only the
/// first call has any effect.
pub fn set_config_path(path: &Path) {
    if CONFIG_PATH.set(path.to_path_buf()).is_err() {
        debug!("config path already set, ignoring {path:?}");
    }
}

pub fn config_path() -> &'static Path {
    CONFIG_PATH.get_or_init(|| PathBuf::from(DEFAULT_CONFIG_FILE))
}

/// get config from global, or load from file if not parsed yet
pub fn get_config() -> Result<Config> {
    // return already parsed value
    if let Some(existing) = CONFIG.get() {
        return Ok(existing);
    }

    let path = config_path();
    if !path.exists() {
        debug!("{path:?} not found, using built-in defaults");
    }

    let config = config::parse(path).context("could not load configuration")?;
    Ok(CONFIG.get_or_init(|| config))
}

/// Local files the config points at that do not exist. Optional files (the
/// metrics variants and the ServiceMonitor) are not checked.
pub fn missing_files(config: &KindstackConfig) -> Vec<PathBuf> {
    let app = &config.app;
    let mut required: Vec<PathBuf> = app.manifests.clone();
    required.extend(config.monitoring.components.iter().map(|c| c.manifest.clone()));
    required.push(config.policies.directory.clone());
    if let Some(kind_config) = &config.cluster.kind_config {
        required.push(kind_config.clone());
    }

    let dockerfiles = [
        app.context.join(&app.dockerfile),
        app.context.join(&app.metrics_dockerfile),
    ];
    if !dockerfiles.iter().any(|f| f.is_file()) {
        required.push(dockerfiles[0].clone());
    }

    required.into_iter().filter(|p| !p.exists()).collect()
}
