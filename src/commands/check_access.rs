use anyhow::{Context, Result};
use simplelog::*;

use crate::access_handlers as access;
use crate::cluster::{ClusterProvisioner, Kind};
use crate::commands::{config_or_exit, finish};

pub fn run() {
    let config = config_or_exit();
    let kind = Kind::new(&config.cluster.name);

    finish(check_all(&kind), "  all good!");
}

fn check_all(kind: &Kind) -> Result<()> {
    info!("checking tools...");
    access::tools::check()?;

    info!("checking docker...");
    access::docker::check()?;

    if kind.cluster_exists()? {
        info!("checking cluster {}...", kind.name());
        access::kube::check(&kind.context())
            .with_context(|| format!("could not access cluster {}", kind.name()))?;
    } else {
        warn!(
            "cluster {} does not exist yet, run cluster-setup first",
            kind.name()
        );
    }

    Ok(())
}
