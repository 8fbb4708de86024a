use anyhow::{bail, Context, Result};
use simplelog::*;
use std::time::{Duration, Instant};

use crate::readiness::{CancelToken, PollOutcome, ReadinessCheck, WaitConfig, Waiter};

/// A named readiness wait inside a deployment sequence.
///
/// A required gate that times out aborts the sequence; an advisory one only
/// produces a warning.
pub struct Gate<'c> {
    name: String,
    required: bool,
    config: WaitConfig,
    check: Box<dyn ReadinessCheck + 'c>,
}

impl<'c> Gate<'c> {
    pub fn required(name: &str, config: WaitConfig, check: impl ReadinessCheck + 'c) -> Self {
        Self::new(name, true, config, check)
    }

    pub fn advisory(name: &str, config: WaitConfig, check: impl ReadinessCheck + 'c) -> Self {
        Self::new(name, false, config, check)
    }

    pub fn new(
        name: &str,
        required: bool,
        config: WaitConfig,
        check: impl ReadinessCheck + 'c,
    ) -> Self {
        Self {
            name: name.to_string(),
            required,
            config,
            check: Box::new(check),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateReport {
    pub name: String,
    pub required: bool,
    pub outcome: PollOutcome,
    pub elapsed: Duration,
}

/// Runs gates in order and keeps a report for each one.
#[derive(Default)]
pub struct Gates {
    reports: Vec<GateReport>,
    cancel: Option<CancelToken>,
}

impl Gates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interrupt any in-flight gate when `token` is cancelled.
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Wait on `gate`. Errors if its check breaks, or if it is required and
    /// times out; an advisory timeout is returned as `TimedOut`.
    pub fn run(&mut self, mut gate: Gate<'_>) -> Result<PollOutcome> {
        info!("waiting for {}...", gate.name);

        let name = gate.name.clone();
        let mut waiter = Waiter::new(gate.config).on_attempt(|attempt| {
            info!(
                "  <bright-black>still waiting for {name} ({}s elapsed)</>",
                attempt.elapsed.as_secs()
            )
        });
        if let Some(token) = &self.cancel {
            waiter = waiter.cancel_with(token.clone());
        }

        let start = Instant::now();
        let outcome = waiter
            .wait(gate.check.as_mut())
            .with_context(|| format!("could not check {}", gate.name))?;
        let elapsed = start.elapsed();

        self.reports.push(GateReport {
            name: gate.name.clone(),
            required: gate.required,
            outcome,
            elapsed,
        });

        match (outcome, gate.required) {
            (PollOutcome::Ready, _) => info!("  <green>{} ready</>", gate.name),
            (PollOutcome::TimedOut, true) => bail!(
                "{} not ready after {}s",
                gate.name,
                elapsed.as_secs()
            ),
            (PollOutcome::TimedOut, false) => warn!(
                "  <yellow>{} not ready after {}s, continuing anyway</>",
                gate.name,
                elapsed.as_secs()
            ),
        }

        Ok(outcome)
    }

    pub fn reports(&self) -> &[GateReport] {
        &self.reports
    }

    /// Advisory gates that timed out.
    pub fn warnings(&self) -> impl Iterator<Item = &GateReport> {
        self.reports
            .iter()
            .filter(|r| !r.required && r.outcome == PollOutcome::TimedOut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn quick() -> WaitConfig {
        WaitConfig::new(Duration::from_millis(5), Duration::from_millis(20)).unwrap()
    }

    #[test]
    fn required_timeout_names_the_gate() {
        let mut gates = Gates::new();
        let err = gates
            .run(Gate::required("app pods", quick(), || -> Result<bool> { Ok(false) }))
            .unwrap_err();

        assert!(err.to_string().starts_with("app pods not ready after"));
        assert_eq!(gates.reports().len(), 1);
        assert_eq!(gates.reports()[0].outcome, PollOutcome::TimedOut);
    }

    #[test]
    fn advisory_timeout_continues() {
        let mut gates = Gates::new();
        let outcome = gates
            .run(Gate::advisory("grafana url", quick(), || -> Result<bool> { Ok(false) }))
            .unwrap();
        gates
            .run(Gate::required("nodes", quick(), || -> Result<bool> { Ok(true) }))
            .unwrap();

        assert_eq!(outcome, PollOutcome::TimedOut);
        assert_eq!(
            gates.warnings().map(|r| r.name.as_str()).collect::<Vec<_>>(),
            vec!["grafana url"]
        );
    }

    #[test]
    fn broken_check_is_an_error_even_when_advisory() {
        let mut gates = Gates::new();
        let result = gates.run(Gate::advisory("broken", quick(), || -> Result<bool> {
            bail!("kubectl exploded")
        }));

        assert!(format!("{:#}", result.unwrap_err()).contains("kubectl exploded"));
        assert!(gates.reports().is_empty());
    }
}
