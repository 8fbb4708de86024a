use anyhow::{anyhow, Context, Result};
use k8s_openapi::api::authentication::v1::SelfSubjectReview;
use k8s_openapi::serde_json::{from_value, json};
use simplelog::*;

use crate::clients::kube_client;

/// kubernetes access checks
#[tokio::main(flavor = "current_thread")] // make this a sync function
pub async fn check(context: &str) -> Result<()> {
    // build a client
    let client = kube_client(context).await?;

    // try to get cluster info (whoami)
    let reviewapi: kube::Api<SelfSubjectReview> = kube::Api::all(client);
    let resp = reviewapi
        .create(
            &kube::api::PostParams::default(),
            &from_value(json!({
                "apiVersion": "authentication.k8s.io/v1",
                "kind": "SelfSubjectReview"
            }))?,
        )
        .await
        .with_context(|| format!("could not reach cluster API for context {context}"))?;
    let status = resp.status.ok_or(anyhow!("Could not access cluster"))?;

    debug!(
        "authenticated as {:?}",
        status
            .user_info
            .and_then(|u| u.username)
            .unwrap_or("(no username)".into())
    );

    Ok(())
}
