// Stock readiness checks used by the deployment steps.

use anyhow::Result;
use reqwest::blocking::Client;
use reqwest::StatusCode;
use simplelog::*;
use std::time::Duration;

use super::ReadinessCheck;
use crate::cluster::{all_ready, ClusterControlPlane, Selector};

/// Every container of every pod matching the selector reports ready, and
/// there is at least one such pod.
pub struct PodsReady<'a, P: ?Sized> {
    plane: &'a P,
    selector: Selector,
}

impl<'a, P: ClusterControlPlane + ?Sized> PodsReady<'a, P> {
    pub fn new(plane: &'a P, selector: Selector) -> Self {
        Self { plane, selector }
    }
}

impl<P: ClusterControlPlane + ?Sized> ReadinessCheck for PodsReady<'_, P> {
    fn is_ready(&mut self) -> Result<bool> {
        let flags = self.plane.pod_readiness(&self.selector)?;
        trace!("readiness for {}: {flags:?}", self.selector);
        Ok(all_ready(&flags))
    }

    fn describe(&self) -> String {
        format!("pods {}", self.selector)
    }
}

/// Every pod matching the selector is in phase `Running`.
pub struct PodsRunning<'a, P: ?Sized> {
    plane: &'a P,
    selector: Selector,
}

impl<'a, P: ClusterControlPlane + ?Sized> PodsRunning<'a, P> {
    pub fn new(plane: &'a P, selector: Selector) -> Self {
        Self { plane, selector }
    }
}

impl<P: ClusterControlPlane + ?Sized> ReadinessCheck for PodsRunning<'_, P> {
    fn is_ready(&mut self) -> Result<bool> {
        let phases = self.plane.pod_phases(&self.selector)?;
        Ok(!phases.is_empty() && phases.iter().all(|p| p == "Running"))
    }

    fn describe(&self) -> String {
        format!("running pods {}", self.selector)
    }
}

/// Every node in the cluster has condition `Ready=True`.
pub struct NodesReady<'a, P: ?Sized> {
    plane: &'a P,
}

impl<'a, P: ClusterControlPlane + ?Sized> NodesReady<'a, P> {
    pub fn new(plane: &'a P) -> Self {
        Self { plane }
    }
}

impl<P: ClusterControlPlane + ?Sized> ReadinessCheck for NodesReady<'_, P> {
    fn is_ready(&mut self) -> Result<bool> {
        Ok(all_ready(&self.plane.node_readiness()?))
    }

    fn describe(&self) -> String {
        "cluster nodes".to_string()
    }
}

/// Build the short-timeout client used for polling HTTP endpoints.
pub fn probe_client() -> Result<Client> {
    Ok(Client::builder().timeout(Duration::from_secs(2)).build()?)
}

/// A GET on `url` answers 200. Connection errors count as "not yet", since an
/// endpoint that is still starting up refuses connections.
pub struct HttpOk {
    client: Client,
    url: String,
    basic_auth: Option<(String, String)>,
}

impl HttpOk {
    pub fn new(client: Client, url: &str) -> Self {
        Self {
            client,
            url: url.to_string(),
            basic_auth: None,
        }
    }

    /// Authenticated variant, e.g. a Grafana `/api/user` login check.
    pub fn with_basic_auth(mut self, user: &str, pass: &str) -> Self {
        self.basic_auth = Some((user.to_string(), pass.to_string()));
        self
    }
}

impl ReadinessCheck for HttpOk {
    fn is_ready(&mut self) -> Result<bool> {
        let mut req = self.client.get(&self.url);
        if let Some((user, pass)) = &self.basic_auth {
            req = req.basic_auth(user, Some(pass));
        }

        match req.send() {
            Ok(resp) => {
                trace!("GET {} -> {}", self.url, resp.status());
                Ok(resp.status() == StatusCode::OK)
            }
            Err(e) => {
                trace!("GET {} failed: {e}", self.url);
                Ok(false)
            }
        }
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::FakeCluster;
    use crate::readiness::{wait_until_ready, PollOutcome, WaitConfig};

    #[test]
    fn pods_ready_waits_for_every_container() {
        let sel = Selector::new("default", "app=football-intro-app");
        let fake = FakeCluster::new().script_readiness(
            sel.clone(),
            vec![vec![], vec![true, false], vec![true, true]],
        );

        let config = WaitConfig::new(Duration::from_millis(5), Duration::from_secs(2)).unwrap();
        let outcome = wait_until_ready(PodsReady::new(&fake, sel.clone()), config).unwrap();

        assert_eq!(outcome, PollOutcome::Ready);
        assert_eq!(fake.polls(&sel), 3);
    }

    #[test]
    fn pods_running_needs_all_running() {
        let sel = Selector::new("kube-system", "k8s-app=cilium");
        let fake = FakeCluster::new().script_phases(sel.clone(), vec![vec!["Running", "Pending"]]);

        let mut check = PodsRunning::new(&fake, sel);
        assert!(!check.is_ready().unwrap());
    }

    #[test]
    fn query_errors_are_not_swallowed() {
        let sel = Selector::new("default", "app=web");
        let fake = FakeCluster::new().fail_on("pod-readiness");

        let mut check = PodsReady::new(&fake, sel);
        assert!(check.is_ready().is_err());
    }

    #[test]
    fn refused_connection_is_not_ready() {
        // nothing listens on port 9 on a test box
        let mut check = HttpOk::new(probe_client().unwrap(), "http://127.0.0.1:9/");
        assert!(!check.is_ready().unwrap());
    }
}
