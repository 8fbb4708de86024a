use anyhow::bail;
use simplelog::*;

use crate::commands::{config_or_exit, finish, Tools};
use crate::policies::{probe_plan, run_probes, show_policies};

pub fn run() {
    let config = config_or_exit();
    let tools = Tools::for_config(config);

    info!("testing network policies...");
    let plan = probe_plan(&config.policies, &config.app);
    let result = run_probes(&tools.kubectl, &config.policies, &config.app, &plan).and_then(
        |results| {
            println!("{}", show_policies(&tools.kubectl, &config.app.namespace));

            let failed: Vec<_> = results.iter().filter(|r| !r.passed()).collect();
            if !failed.is_empty() {
                bail!(
                    "{} of {} probes contradict the policies: {}",
                    failed.len(),
                    results.len(),
                    failed.iter().map(|r| r.name.as_str()).collect::<Vec<_>>().join(", ")
                );
            }
            Ok(())
        },
    );

    finish(result, "network policies behave as expected!")
}
