use anyhow::{bail, Result};
use simplelog::*;

use crate::utils::tool_installed;

/// Tools every command needs, and where to get them.
pub const REQUIRED_TOOLS: &[(&str, &str)] = &[
    ("kind", "https://kind.sigs.k8s.io/docs/user/quick-start/"),
    ("kubectl", "https://kubernetes.io/docs/tasks/tools/"),
];

/// Only needed for Cilium; kubectl manifests are the fallback.
pub const OPTIONAL_TOOLS: &[(&str, &str)] = &[("helm", "https://helm.sh/docs/intro/install/")];

/// external tool checks
pub fn check() -> Result<()> {
    let missing: Vec<_> = REQUIRED_TOOLS
        .iter()
        .filter(|(tool, _)| !tool_installed(tool))
        .collect();

    for (tool, url) in OPTIONAL_TOOLS {
        if !tool_installed(tool) {
            warn!("{tool} is not installed, falling back to plain manifests (install from {url})");
        }
    }

    if !missing.is_empty() {
        for (tool, url) in &missing {
            error!("{tool} is not installed, install it from {url}");
        }
        bail!(
            "missing required tools: {}",
            missing.iter().map(|(tool, _)| *tool).collect::<Vec<_>>().join(", ")
        );
    }

    Ok(())
}
