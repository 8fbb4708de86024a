pub mod check_access;
pub mod cluster_setup;
pub mod dashboard;
pub mod deploy;
pub mod monitoring;
pub mod policies;
pub mod port_forward;
pub mod status;
pub mod test_policies;
pub mod validate;

// These modules should not do much and act mostly as a thunk to handle
// displaying outputs/errors of the real function.

use anyhow::Result;
use simplelog::*;
use std::process::exit;

use crate::cluster::{Helm, Kind, Kubectl};
use crate::configparser::{get_config, Config};
use crate::deploy::gates::Gates;
use crate::deploy::Stack;
use crate::interrupt;

/// Production tools, all pointed at the configured kind cluster.
pub struct Tools {
    pub kubectl: Kubectl,
    pub kind: Kind,
    pub helm: Helm,
}

impl Tools {
    pub fn for_config(config: Config) -> Self {
        let kind = Kind::new(&config.cluster.name);
        let context = kind.context();
        Self {
            kubectl: Kubectl::new(&context),
            helm: Helm::new(&context),
            kind,
        }
    }

    pub fn stack(&self) -> Stack<'_> {
        Stack {
            plane: &self.kubectl,
            provisioner: &self.kind,
            charts: &self.helm,
        }
    }
}

/// Load config, or print why not and exit.
pub fn config_or_exit() -> Config {
    match get_config() {
        Ok(config) => config,
        Err(err) => {
            error!("{err:?}");
            exit(1)
        }
    }
}

/// Gates that stop early on Ctrl-C.
pub fn interruptible_gates() -> Gates {
    Gates::new().with_cancel(interrupt::install_handler())
}

/// Print the error chain and exit non-zero on failure.
pub fn finish(result: Result<()>, success: &str) {
    match result {
        Ok(()) => info!("<green>{success}</>"),
        Err(err) => {
            error!("{err:?}");
            exit(1)
        }
    }
}
