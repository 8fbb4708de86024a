use simplelog::*;

use crate::commands::{config_or_exit, finish, Tools};
use crate::policies::{apply_action, show_policies, PolicyAction};

pub fn run(action: &PolicyAction) {
    let config = config_or_exit();
    let tools = Tools::for_config(config);
    let namespace = &config.app.namespace;

    let result = apply_action(&tools.kubectl, &config.policies, namespace, *action);
    if result.is_ok() {
        println!("{}", show_policies(&tools.kubectl, namespace));
        info!("test policies with `kindstack test-policies`");
    }
    finish(result, "policies updated!")
}
