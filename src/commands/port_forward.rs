use anyhow::{bail, Result};
use simplelog::*;

use crate::commands::{config_or_exit, finish, Tools};
use crate::deploy::gates::Gates;
use crate::interrupt;
use crate::portforward::{gate_urls, kubectl_spawner, start_forwards};

pub fn run() {
    let config = config_or_exit();
    let tools = Tools::for_config(config);
    let token = interrupt::install_handler();
    let mut gates = Gates::new().with_cancel(token.clone());

    let result = (|| -> Result<()> {
        let mut session = start_forwards(
            &tools.kubectl,
            &config.port_forwards,
            kubectl_spawner(&tools.kubectl),
        )?;
        if session.is_empty() {
            bail!("none of the configured services exist, deploy first");
        }

        gate_urls(&mut gates, &session, config.waits.http.to_config()?)?;

        info!("services available at:");
        for fwd in session.forwards() {
            info!("  {}: <cyan>{}</>", fwd.config.name, fwd.config.url());
        }
        info!("press Ctrl-C to stop");

        token.wait();
        session.stop_all();
        Ok(())
    })();

    finish(result, "port-forwards stopped")
}
