use simplelog::*;
use std::process::exit;

use crate::commands::{config_or_exit, Tools};
use crate::deploy::cluster_status;

pub fn run() {
    let config = config_or_exit();
    let tools = Tools::for_config(config);

    match cluster_status(&tools.kubectl, &config.app.namespace) {
        Ok(status) => println!("{status}"),
        Err(err) => {
            error!("{err:?}");
            exit(1)
        }
    }
}
