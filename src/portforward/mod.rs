// Background `kubectl port-forward` children for the configured services.

use anyhow::{Context, Result};
use simplelog::*;

use crate::cluster::{ClusterControlPlane, Kubectl, ResourceRef};
use crate::configparser::config::PortForwardConfig;
use crate::deploy::gates::{Gate, Gates};
use crate::readiness::checks::{probe_client, HttpOk};
use crate::readiness::WaitConfig;

/// A running forward that can be torn down.
pub trait ForwardHandle {
    fn stop(&mut self) -> Result<()>;
}

impl ForwardHandle for duct::Handle {
    fn stop(&mut self) -> Result<()> {
        self.kill().context("could not stop port-forward")
    }
}

pub struct ActiveForward {
    pub config: PortForwardConfig,
    handle: Box<dyn ForwardHandle>,
}

/// Every forward started by [`start_forwards`]. Children are stopped on drop.
#[derive(Default)]
pub struct Session {
    forwards: Vec<ActiveForward>,
}

impl Session {
    pub fn forwards(&self) -> &[ActiveForward] {
        &self.forwards
    }

    pub fn is_empty(&self) -> bool {
        self.forwards.is_empty()
    }

    /// Stop every child, logging failures instead of bailing so the rest
    /// still get stopped.
    pub fn stop_all(&mut self) {
        for mut fwd in self.forwards.drain(..) {
            debug!("stopping port-forward for {}", fwd.config.service);
            if let Err(e) = fwd.handle.stop() {
                warn!("{}: {e:#}", fwd.config.name);
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.stop_all();
    }
}

/// Start a forward for each configured service that exists in the cluster.
/// Missing services are skipped with a warning.
pub fn start_forwards<F>(
    plane: &dyn ClusterControlPlane,
    forwards: &[PortForwardConfig],
    mut spawn: F,
) -> Result<Session>
where
    F: FnMut(&PortForwardConfig) -> Result<Box<dyn ForwardHandle>>,
{
    let mut session = Session::default();

    for fwd in forwards {
        let service = ResourceRef::new("service", &fwd.service).in_namespace(&fwd.namespace);
        if !plane.resource_exists(&service)? {
            warn!("<yellow>{} not found, skipping {}</>", service, fwd.name);
            continue;
        }

        info!(
            "forwarding {} to localhost:{} ({})",
            fwd.service, fwd.local_port, fwd.name
        );
        let handle = spawn(fwd)?;
        session.forwards.push(ActiveForward {
            config: fwd.clone(),
            handle,
        });
    }

    Ok(session)
}

/// Spawner for [`start_forwards`] backed by kubectl.
pub fn kubectl_spawner(
    kubectl: &Kubectl,
) -> impl FnMut(&PortForwardConfig) -> Result<Box<dyn ForwardHandle>> + '_ {
    move |fwd| {
        let handle =
            kubectl.port_forward(&fwd.namespace, &fwd.service, fwd.local_port, fwd.remote_port)?;
        Ok(Box::new(handle) as Box<dyn ForwardHandle>)
    }
}

/// Wait for every forwarded URL to answer. Each one is advisory; a service
/// that is slow to come up should not take the others down with it.
pub fn gate_urls(gates: &mut Gates, session: &Session, config: WaitConfig) -> Result<()> {
    let client = probe_client()?;
    for fwd in session.forwards() {
        let url = fwd.config.url();
        gates.run(Gate::advisory(
            &format!("{} at {url}", fwd.config.name),
            config,
            HttpOk::new(client.clone(), &url),
        ))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::FakeCluster;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct Counted(Arc<AtomicUsize>);

    impl ForwardHandle for Counted {
        fn stop(&mut self) -> Result<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn forward(name: &str, service: &str, port: u16) -> PortForwardConfig {
        PortForwardConfig {
            name: name.to_string(),
            service: service.to_string(),
            namespace: "default".to_string(),
            local_port: port,
            remote_port: port,
        }
    }

    #[test]
    fn missing_services_are_skipped_and_children_stopped_on_drop() {
        let stopped = Arc::new(AtomicUsize::new(0));
        let fake = FakeCluster::new()
            .with_resource(ResourceRef::new("service", "grafana").in_namespace("default"));

        let session = start_forwards(
            &fake,
            &[forward("Prometheus", "prometheus", 9090), forward("Grafana", "grafana", 3000)],
            |_| Ok(Box::new(Counted(stopped.clone())) as Box<dyn ForwardHandle>),
        )
        .unwrap();

        let names: Vec<_> = session.forwards().iter().map(|f| f.config.name.as_str()).collect();
        assert_eq!(names, vec!["Grafana"]);

        drop(session);
        assert_eq!(stopped.load(Ordering::SeqCst), 1);
    }
}
