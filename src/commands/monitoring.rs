use simplelog::*;

use crate::commands::{config_or_exit, finish, interruptible_gates, Tools};
use crate::deploy::{configure_grafana, deploy_monitoring};
use crate::grafana::Grafana;

pub fn run(no_dashboard: &bool) {
    let config = config_or_exit();
    let tools = Tools::for_config(config);
    let mut gates = interruptible_gates();

    let result = deploy_monitoring(&tools.stack(), config, &mut gates).and_then(|()| {
        let grafana = Grafana::from_config(&config.monitoring.grafana)?;
        if let Some(url) = configure_grafana(&grafana, config, !*no_dashboard, &mut gates)? {
            info!("dashboard: <cyan>{url}</>");
        }
        Ok(())
    });

    if result.is_ok() {
        let grafana = &config.monitoring.grafana;
        info!("Grafana: <cyan>{}</> ({} / {})", grafana.url, grafana.user, grafana.pass);
        for warning in gates.warnings() {
            warn!("{} did not come up in time", warning.name);
        }
    }
    finish(result, "monitoring deployed!")
}
