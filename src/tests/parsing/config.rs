use figment::Jail;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[cfg(test)]
use pretty_assertions::assert_eq;

use crate::configparser::config::*;
use crate::configparser::missing_files;

/// figment::Error cannot coerce from anyhow::Error natively
fn parse_in_jail(path: &str) -> Result<KindstackConfig, figment::Error> {
    parse(Path::new(path)).map_err(|e| figment::Error::from(format!("{:?}", e)))
}

#[test]
/// No config file at all gives the built-in football app layout
fn defaults_without_file() {
    Jail::expect_with(|jail| {
        jail.clear_env();

        let config = parse_in_jail("kindstack.yaml")?;
        assert_eq!(config, KindstackConfig::default());
        assert_eq!(config.cluster.name, "football-app-cluster");
        assert_eq!(config.port_forwards.len(), 3);
        assert_eq!(
            config.waits.pods.to_config().unwrap().timeout(),
            Duration::from_secs(120)
        );

        Ok(())
    });
}

#[test]
/// Fields in the yaml override defaults, everything else is kept
fn partial_yaml() {
    Jail::expect_with(|jail| {
        jail.clear_env();
        jail.create_file(
            "kindstack.yaml",
            r#"
                cluster:
                    name: demo
                    port_mappings:
                      - { container_port: 30080, host_port: 9080 }

                app:
                    image: demo-app:dev

                port_forwards:
                  - name: App
                    service: demo-svc
                    local_port: 8081
                    remote_port: 80

                waits:
                    http: { interval: 2, timeout: 10 }
            "#,
        )?;

        let config = parse_in_jail("kindstack.yaml")?;

        assert_eq!(config.cluster.name, "demo");
        assert_eq!(config.cluster.port_mappings, vec![PortMapping::new(30080, 9080)]);
        assert_eq!(config.app.image, "demo-app:dev");
        assert_eq!(config.app.label, "app=football-intro-app");
        assert_eq!(
            config.port_forwards,
            vec![PortForwardConfig {
                name: "App".to_string(),
                service: "demo-svc".to_string(),
                namespace: "default".to_string(),
                local_port: 8081,
                remote_port: 80,
            }]
        );
        assert_eq!(
            config.waits.http,
            WaitSettings {
                interval: 2,
                timeout: 10
            }
        );
        assert_eq!(config.waits.nodes, Waits::default().nodes);

        Ok(())
    });
}

#[test]
/// Envvars beat the yaml file
fn yaml_with_env_overrides() {
    Jail::expect_with(|jail| {
        jail.clear_env();
        jail.create_file(
            "kindstack.yaml",
            r#"
                cluster:
                    name: from-yaml
                monitoring:
                    grafana:
                        pass: yamlpass
            "#,
        )?;

        jail.set_env("KINDSTACK_CLUSTER__NAME", "from-env");
        jail.set_env("KINDSTACK_MONITORING__GRAFANA__PASS", "envpass");
        jail.set_env("KINDSTACK_WAITS__PODS__TIMEOUT", "30");

        let config = parse_in_jail("kindstack.yaml")?;

        assert_eq!(config.cluster.name, "from-env");
        assert_eq!(config.monitoring.grafana.pass, "envpass");
        assert_eq!(config.monitoring.grafana.user, "admin");
        assert_eq!(config.waits.pods.timeout, 30);
        assert_eq!(config.waits.pods.interval, 5);

        Ok(())
    });
}

#[test]
fn wrong_types_are_errors() {
    Jail::expect_with(|jail| {
        jail.clear_env();
        jail.create_file(
            "kindstack.yaml",
            r#"
                waits:
                    pods: { interval: soon, timeout: 10 }
            "#,
        )?;

        assert!(parse_in_jail("kindstack.yaml").is_err());

        Ok(())
    });
}

#[test]
fn missing_files_reported() {
    Jail::expect_with(|jail| {
        jail.clear_env();
        std::fs::create_dir("k8s").map_err(|e| e.to_string())?;
        std::fs::create_dir("network-policies").map_err(|e| e.to_string())?;
        jail.create_file("Dockerfile.metrics", "FROM nginx")?;
        jail.create_file("k8s/deployment.yaml", "")?;
        jail.create_file("k8s/service.yaml", "")?;
        jail.create_file("k8s/nginx-exporter.yaml", "")?;
        jail.create_file("k8s/prometheus-deployment.yaml", "")?;

        let config = parse_in_jail("kindstack.yaml")?;
        assert_eq!(
            missing_files(&config),
            vec![PathBuf::from("k8s/grafana-deployment.yaml")]
        );

        Ok(())
    });
}
