use simplelog::*;

use crate::commands::{config_or_exit, finish, interruptible_gates, Tools};
use crate::deploy::{setup_cluster, SetupOptions};

pub fn run(cilium: &bool, recreate: &bool) {
    info!("setting up cluster...");
    let config = config_or_exit();
    let tools = Tools::for_config(config);
    let mut gates = interruptible_gates();

    let opts = SetupOptions {
        cilium: *cilium,
        recreate: *recreate,
    };
    let result = setup_cluster(&tools.stack(), config, opts, &mut gates);

    if result.is_ok() && *cilium {
        info!("next: deploy the app, then `kindstack policies` and `kindstack test-policies`");
    }
    finish(result, "cluster ready!")
}
