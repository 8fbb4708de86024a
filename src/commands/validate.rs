use simplelog::*;
use std::process::exit;

use crate::configparser::{config_path, get_config, missing_files};

pub fn run() {
    info!("validating config...");

    let config = match get_config() {
        Ok(config) => config,
        Err(err) => {
            error!("{err:?}");
            exit(1);
        }
    };
    debug!("loaded config from {:?}", config_path());

    let missing = missing_files(config);
    if !missing.is_empty() {
        for path in &missing {
            error!("missing file: {path:?}");
        }
        exit(1);
    }

    info!("config is ok!")
}
