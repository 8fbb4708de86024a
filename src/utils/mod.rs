use anyhow::{bail, Context, Result};
use duct::cmd;
use itertools::Itertools;
use simplelog::*;
use std::ffi::OsString;

/// Run `program` with `args`, returning stdout. A non-zero exit turns into an
/// error carrying the program's stderr.
pub fn run_captured<I, S>(program: &str, args: I) -> Result<String>
where
    I: IntoIterator<Item = S>,
    S: Into<OsString>,
{
    let args: Vec<OsString> = args.into_iter().map(Into::into).collect();
    debug!(
        "running {program} {}",
        args.iter().map(|a| a.to_string_lossy()).join(" ")
    );

    let output = cmd(program, &args)
        .stdout_capture()
        .stderr_capture()
        .unchecked()
        .run()
        .with_context(|| format!("could not run {program} (is it installed?)"))?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    trace!("{program} stdout: {stdout}");

    if !output.status.success() {
        bail!(
            "{program} exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(stdout)
}

/// Run `program` with output passed straight through to the terminal, for
/// long-running steps the operator wants to watch.
pub fn run_inherited<I, S>(program: &str, args: I) -> Result<()>
where
    I: IntoIterator<Item = S>,
    S: Into<OsString>,
{
    let args: Vec<OsString> = args.into_iter().map(Into::into).collect();
    debug!(
        "running {program} {}",
        args.iter().map(|a| a.to_string_lossy()).join(" ")
    );

    let status = cmd(program, &args)
        .unchecked()
        .run()
        .with_context(|| format!("could not run {program} (is it installed?)"))?
        .status;

    if !status.success() {
        bail!("{program} exited with {status}");
    }
    Ok(())
}

/// Whether `program` is on PATH and answers one of the usual version flags.
pub fn tool_installed(program: &str) -> bool {
    // `kubectl version` alone also dials the API server
    let probes: [&[&str]; 3] = [&["version", "--client"], &["version"], &["--version"]];
    probes.iter().any(|args| {
        cmd(program, args.iter())
            .stdout_null()
            .stderr_null()
            .unchecked()
            .run()
            .is_ok_and(|out| out.status.success())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_tool_is_not_installed() {
        assert!(!tool_installed("definitely-not-a-real-binary-kindstack"));
    }

    #[test]
    fn missing_tool_errors() {
        let err = run_captured("definitely-not-a-real-binary-kindstack", ["x"]).unwrap_err();
        assert!(format!("{err:#}").contains("could not run"));
    }
}
