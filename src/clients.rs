// Builders for API clients that talk to the cluster directly instead of
// through kubectl.

use anyhow::{Context, Result};
use simplelog::*;

/// Returns Kubernetes Client for the given kubeconfig context
pub async fn kube_client(context: &str) -> Result<kube::Client> {
    debug!("building kube client for context {context}");

    // read in default kubeconfig, pinned to the cluster's context
    let options = kube::config::KubeConfigOptions {
        context: Some(context.to_owned()),
        cluster: None,
        user: None,
    };

    let client_config = kube::Config::from_kubeconfig(&options)
        .await
        .with_context(|| format!("could not load kubeconfig context {context}"))?;

    // client::try_from returns a Result, but the Error is not compatible
    // with anyhow::Error, so assign this with ? and return Ok() separately
    let client = kube::Client::try_from(client_config)?;
    Ok(client)
}
