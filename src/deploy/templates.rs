use anyhow::{Context, Result};
use minijinja::{context, escape_formatter, Environment, Value};

use crate::configparser::config::PortMapping;

// Embed template files into binary.

pub static KIND_CONFIG: &str = include_str!("../asset_files/kind-config.yaml.j2");

pub static GRAFANA_DASHBOARD: &str = include_str!("../asset_files/grafana-dashboard.json.j2");

/// Build template environment with None as default
/// https://github.com/mitsuhiko/minijinja/tree/main/examples/none-as-undefined
pub fn template_env() -> Result<Environment<'static>> {
    let mut env = Environment::new();

    env.add_filter("default", none_default);
    env.set_formatter(|out, state, value| {
        escape_formatter(
            out,
            state,
            if value.is_none() {
                &Value::UNDEFINED
            } else {
                value
            },
        )
    });

    // registered without file extensions so autoescaping stays off; the
    // dashboard template quotes its own values with `tojson`
    env.add_template("kind-config", KIND_CONFIG)?;
    env.add_template("grafana-dashboard", GRAFANA_DASHBOARD)?;

    Ok(env)
}

/// Similar to the regular `default` filter but also handles `none`.
pub fn none_default(value: Value, other: Option<Value>) -> Value {
    if value.is_undefined() || value.is_none() {
        other.unwrap_or_else(|| Value::from(""))
    } else {
        value
    }
}

/// kind cluster config. With `cilium` the default CNI and kube-proxy are
/// left out so Cilium can replace both.
pub fn render_kind_config(name: &str, cilium: bool, port_mappings: &[PortMapping]) -> Result<String> {
    let env = template_env()?;
    env.get_template("kind-config")?
        .render(context! { name, cilium, port_mappings })
        .context("could not render kind cluster config")
}

/// Body for Grafana's `POST /api/dashboards/db`. `refresh` defaults to 10s.
pub fn render_dashboard(
    title: &str,
    job: &str,
    tags: &[&str],
    refresh: Option<&str>,
) -> Result<String> {
    let env = template_env()?;
    env.get_template("grafana-dashboard")?
        .render(context! { title, job, tags, refresh })
        .context("could not render grafana dashboard")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn kind_config_without_cilium() {
        let rendered = render_kind_config("demo", false, &[PortMapping::new(30080, 8080)]).unwrap();

        assert_eq!(
            rendered.trim_end(),
            "kind: Cluster
apiVersion: kind.x-k8s.io/v1alpha4
name: demo
nodes:
  - role: control-plane
    extraPortMappings:
      - containerPort: 30080
        hostPort: 8080
        protocol: TCP"
        );
    }

    #[test]
    fn kind_config_for_cilium_disables_default_cni() {
        let rendered = render_kind_config("demo", true, &[]).unwrap();

        assert!(rendered.contains("disableDefaultCNI: true"));
        assert!(rendered.contains("kubeProxyMode: none"));
        assert!(!rendered.contains("extraPortMappings"));

        let parsed: serde_yml::Value = serde_yml::from_str(&rendered).unwrap();
        assert_eq!(parsed["networking"]["kubeProxyMode"].as_str(), Some("none"));
    }

    #[test]
    fn dashboard_is_valid_json() {
        let rendered = render_dashboard("Football \"App\"", "football-app", &["nginx"], None).unwrap();
        let parsed: k8s_openapi::serde_json::Value =
            k8s_openapi::serde_json::from_str(&rendered).unwrap();

        assert_eq!(parsed["dashboard"]["title"], "Football \"App\"");
        assert_eq!(parsed["dashboard"]["refresh"], "10s");
        assert_eq!(parsed["overwrite"], true);
        assert_eq!(
            parsed["dashboard"]["panels"][0]["targets"][0]["expr"],
            "rate(nginx_http_requests_total{job='football-app'}[5m])"
        );
        assert_eq!(
            parsed["dashboard"]["panels"][0]["targets"][0]["legendFormat"],
            "{{pod_name}}"
        );
    }
}
