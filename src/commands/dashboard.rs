use simplelog::*;

use crate::commands::{config_or_exit, finish};
use crate::deploy::create_dashboard;
use crate::grafana::Grafana;

pub fn run() {
    let config = config_or_exit();
    let grafana_config = &config.monitoring.grafana;

    let result = Grafana::from_config(grafana_config).and_then(|grafana| {
        if !grafana.healthy() {
            anyhow::bail!("Grafana is not reachable at {}", grafana.base_url());
        }
        let url = create_dashboard(&grafana, grafana_config)?;
        info!("dashboard: <cyan>{url}</>");
        Ok(())
    });

    finish(result, "dashboard created!")
}
