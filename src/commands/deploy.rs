use simplelog::*;

use crate::commands::{config_or_exit, finish, interruptible_gates, Tools};
use crate::deploy::{cluster_status, deploy_full_stack, DeployOptions};

pub fn run(no_build: &bool, cilium: &bool, monitoring: &bool) {
    let config = config_or_exit();
    let tools = Tools::for_config(config);
    let mut gates = interruptible_gates();

    let opts = DeployOptions {
        build: !*no_build,
        cilium: *cilium,
        monitoring: *monitoring,
    };
    let result = deploy_full_stack(&tools.stack(), config, opts, &mut gates).and_then(|()| {
        let status = cluster_status(&tools.kubectl, &config.app.namespace)?;
        println!("{status}");
        Ok(())
    });

    if result.is_ok() {
        for fwd in &config.port_forwards {
            info!("  {}: {} (after `kindstack port-forward`)", fwd.name, fwd.url());
        }
    }
    finish(result, "deployment complete!")
}
