// Blocking client for the handful of Grafana HTTP API calls the monitoring
// setup needs.

use anyhow::{bail, Context, Result};
use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use simplelog::*;
use std::time::Duration;

use crate::configparser::config::GrafanaConfig;
use crate::readiness::checks::HttpOk;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Datasource {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
    pub access: String,
    pub is_default: bool,
}

impl Datasource {
    /// Default Prometheus datasource, proxied through the Grafana server.
    pub fn prometheus(url: &str) -> Self {
        Self {
            name: "Prometheus".to_string(),
            kind: "prometheus".to_string(),
            url: url.to_string(),
            access: "proxy".to_string(),
            is_default: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasourceStatus {
    Created,
    AlreadyExists,
}

#[derive(Debug, Deserialize)]
struct DashboardResponse {
    #[serde(default)]
    url: Option<String>,
}

pub struct Grafana {
    client: Client,
    base_url: String,
    user: String,
    pass: String,
}

impl Grafana {
    pub fn new(base_url: &str, user: &str, pass: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("could not build http client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            user: user.to_string(),
            pass: pass.to_string(),
        })
    }

    pub fn from_config(config: &GrafanaConfig) -> Result<Self> {
        Self::new(&config.url, &config.user, &config.pass)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// `GET /api/health` answers 200.
    pub fn healthy(&self) -> bool {
        match self.client.get(self.endpoint("/api/health")).send() {
            Ok(resp) => resp.status() == StatusCode::OK,
            Err(e) => {
                debug!("grafana health check failed: {e}");
                false
            }
        }
    }

    /// Readiness check that passes once the configured credentials work.
    pub fn login_ok(&self) -> HttpOk {
        HttpOk::new(self.client.clone(), &self.endpoint("/api/user"))
            .with_basic_auth(&self.user, &self.pass)
    }

    pub fn add_datasource(&self, datasource: &Datasource) -> Result<DatasourceStatus> {
        debug!("adding grafana datasource {}", datasource.name);
        let resp = self
            .client
            .post(self.endpoint("/api/datasources"))
            .basic_auth(&self.user, Some(&self.pass))
            .json(datasource)
            .send()
            .with_context(|| format!("could not reach grafana at {}", self.base_url))?;

        match resp.status() {
            s if s.is_success() => Ok(DatasourceStatus::Created),
            StatusCode::CONFLICT => Ok(DatasourceStatus::AlreadyExists),
            s => bail!(
                "grafana rejected datasource {}: {s} {}",
                datasource.name,
                resp.text().unwrap_or_default().trim()
            ),
        }
    }

    /// Create or overwrite a dashboard from a rendered payload, returning its
    /// absolute URL.
    pub fn upsert_dashboard(&self, payload: String) -> Result<String> {
        let resp = self
            .client
            .post(self.endpoint("/api/dashboards/db"))
            .basic_auth(&self.user, Some(&self.pass))
            .header(CONTENT_TYPE, "application/json")
            .body(payload)
            .send()
            .with_context(|| format!("could not reach grafana at {}", self.base_url))?;

        let status = resp.status();
        if !status.is_success() {
            bail!(
                "grafana rejected dashboard: {status} {}",
                resp.text().unwrap_or_default().trim()
            );
        }

        let body: DashboardResponse = resp.json().context("unexpected grafana response")?;
        Ok(match body.url {
            Some(path) => self.endpoint(&path),
            None => self.base_url.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn datasource_wire_names() {
        let ds = Datasource::prometheus("http://prometheus:9090");
        let json = k8s_openapi::serde_json::to_value(&ds).unwrap();

        assert_eq!(json["type"], "prometheus");
        assert_eq!(json["isDefault"], true);
        assert_eq!(json["access"], "proxy");
    }

    #[test]
    fn base_url_trailing_slash() {
        let grafana = Grafana::new("http://localhost:30030/", "admin", "admin").unwrap();
        assert_eq!(grafana.endpoint("/api/health"), "http://localhost:30030/api/health");
    }

    #[test]
    fn unreachable_is_unhealthy() {
        let grafana = Grafana::new("http://127.0.0.1:9", "admin", "admin").unwrap();
        assert!(!grafana.healthy());
    }
}
