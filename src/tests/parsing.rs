mod config;

use crate::configparser::config::*;

#[test]
fn valid_component_yaml() {
    let parsed = serde_yml::from_str::<MonitoringComponent>(
        r#"
            name: loki
            label: app=loki
            manifest: k8s/loki.yaml
        "#,
    )
    .unwrap();

    // optional fields fall back to their defaults
    assert!(parsed.required);
    assert!(parsed.stale.is_empty());
    assert_eq!(parsed.url, None);
}

#[test]
fn invalid_port_forward_yaml() {
    let parsed = serde_yml::from_str::<PortForwardConfig>(
        r#"
            name: there's no port here
            service: grafana
        "#,
    );

    assert!(parsed.is_err());
}

#[test]
fn zero_interval_rejected_on_conversion() {
    let settings = WaitSettings {
        interval: 0,
        timeout: 10,
    };

    assert!(settings.to_config().is_err());
}
