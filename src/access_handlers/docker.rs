use anyhow::{Context, Result};
use simplelog::*;

use crate::builder::docker::check_daemon;

/// container daemon access checks
pub fn check() -> Result<()> {
    // images are side-loaded into kind, no registry login needed
    let version = check_daemon().context("could not talk to the container daemon")?;
    debug!("docker daemon version {version}");

    Ok(())
}
