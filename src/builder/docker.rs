use anyhow::{anyhow, bail, Context, Result};
use bollard::errors::Error as DockerError;
use bollard::image::BuildImageOptions;
use bollard::Docker;
use futures::StreamExt;
use simplelog::*;
use std::path::Path;
use std::sync::LazyLock;

#[tokio::main(flavor = "current_thread")] // make this a sync function
pub async fn build_image(context: &Path, dockerfile: &Path, tag: &str) -> Result<String> {
    trace!("building image in directory {context:?} to tag {tag:?}");
    let client = client().await?;

    let build_opts = BuildImageOptions {
        dockerfile: dockerfile.to_string_lossy().into_owned(),
        t: tag.to_string(),
        forcerm: true,
        ..Default::default()
    };

    // tar up image context
    let mut tar = tar::Builder::new(Vec::new());
    tar.append_dir_all("", context)
        .with_context(|| format!("could not create build context tarball from {context:?}"))?;
    let tarball = tar.into_inner()?;

    // send to docker daemon
    let mut build_stream = client.build_image(build_opts, None, Some(tarball.into()));

    // stream output to stdout
    while let Some(item) = build_stream.next().await {
        match item {
            // error from stream?
            Err(DockerError::DockerStreamError { error }) => bail!("build error: {error}"),
            Err(other) => bail!("build error: {other:?}"),
            Ok(msg) => {
                // error from daemon?
                if let Some(e) = msg.error_detail {
                    bail!("error building image: {}", e.message.unwrap_or_default())
                }

                if let Some(log) = msg.stream {
                    let log = log.trim();
                    if !log.is_empty() {
                        info!("building {tag}: <bright-black>{log}</>")
                    }
                }
            }
        }
    }

    Ok(tag.to_string())
}

/// Ping the daemon, for access checks.
#[tokio::main(flavor = "current_thread")] // make this a sync function
pub async fn check_daemon() -> Result<String> {
    let client = client().await?;
    let version = client
        .version()
        .await
        .context("could not get docker daemon version")?;
    Ok(version.version.unwrap_or_else(|| "(unknown version)".to_string()))
}

//
// helper functions
//

// connect to Docker/Podman daemon once and share client
static CLIENT: LazyLock<std::result::Result<Docker, bollard::errors::Error>> =
    LazyLock::new(|| {
        debug!("connecting to docker...");
        Docker::connect_with_defaults()
    });

pub async fn client() -> Result<Docker> {
    let c = CLIENT
        .as_ref()
        .map_err(|_| anyhow!("could not talk to Docker daemon (is DOCKER_HOST correct?)"))?;
    c.ping()
        .await
        // truncate error chain with new error (returned error is way too verbose)
        .map_err(|_| anyhow!("could not talk to Docker daemon (is it running?)"))?;

    Ok(c.clone())
}
