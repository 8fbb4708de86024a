// Poll an external condition until it holds or the time budget runs out.
//
// Every deployment step that has to wait on the cluster (pods coming up,
// nodes joining, a port-forward answering) goes through `Waiter`. It never
// decides what a timeout means; that is up to the caller.

use anyhow::Result;
use simplelog::*;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;

pub mod checks;

#[derive(Debug, Error)]
pub enum WaitError {
    #[error("invalid wait configuration: {0}")]
    InvalidConfig(String),

    #[error("readiness check failed: {0:#}")]
    Check(anyhow::Error),
}

/// Polling cadence and total budget for a single wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitConfig {
    interval: Duration,
    timeout: Duration,
}

impl WaitConfig {
    /// Interval must be non-zero; a zero timeout means "check once".
    pub fn new(interval: Duration, timeout: Duration) -> Result<Self, WaitError> {
        if interval.is_zero() {
            return Err(WaitError::InvalidConfig(
                "polling interval must be greater than zero".to_string(),
            ));
        }
        Ok(Self { interval, timeout })
    }

    pub fn from_secs(interval: u64, timeout: u64) -> Result<Self, WaitError> {
        Self::new(Duration::from_secs(interval), Duration::from_secs(timeout))
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Ready,
    TimedOut,
}

impl PollOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, PollOutcome::Ready)
    }
}

/// A predicate over external state, re-evaluated on every poll.
///
/// `Ok(false)` means "not yet". An `Err` is a broken check and aborts the
/// wait; checks that want transient failures retried must map them to
/// `Ok(false)` themselves.
pub trait ReadinessCheck {
    fn is_ready(&mut self) -> Result<bool>;

    fn describe(&self) -> String {
        "condition".to_string()
    }
}

impl<F> ReadinessCheck for F
where
    F: FnMut() -> Result<bool>,
{
    fn is_ready(&mut self) -> Result<bool> {
        self()
    }
}

/// Progress snapshot handed to the per-attempt callback after a failed check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attempt {
    pub number: u32,
    pub elapsed: Duration,
    pub remaining: Duration,
}

/// Shared flag that interrupts any wait it is attached to.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        let (flag, cvar) = &*self.inner;
        let mut cancelled = flag.lock().unwrap_or_else(|e| e.into_inner());
        *cancelled = true;
        cvar.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        let (flag, _) = &*self.inner;
        *flag.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Sleep for `duration` or until cancelled. Returns true if cancelled.
    pub fn sleep(&self, duration: Duration) -> bool {
        let (flag, cvar) = &*self.inner;
        let guard = flag.lock().unwrap_or_else(|e| e.into_inner());
        let (cancelled, _) = cvar
            .wait_timeout_while(guard, duration, |cancelled| !*cancelled)
            .unwrap_or_else(|e| e.into_inner());
        *cancelled
    }

    /// Block until cancelled.
    pub fn wait(&self) {
        let (flag, cvar) = &*self.inner;
        let guard = flag.lock().unwrap_or_else(|e| e.into_inner());
        let _guard = cvar
            .wait_while(guard, |cancelled| !*cancelled)
            .unwrap_or_else(|e| e.into_inner());
    }
}

/// Blocking poller. Holds no state between calls to [`Waiter::wait`].
pub struct Waiter<'n> {
    config: WaitConfig,
    on_attempt: Option<Box<dyn FnMut(&Attempt) + 'n>>,
    cancel: Option<CancelToken>,
}

impl<'n> Waiter<'n> {
    pub fn new(config: WaitConfig) -> Self {
        Self {
            config,
            on_attempt: None,
            cancel: None,
        }
    }

    /// Called after every unsuccessful evaluation that will be retried.
    pub fn on_attempt(mut self, notify: impl FnMut(&Attempt) + 'n) -> Self {
        self.on_attempt = Some(Box::new(notify));
        self
    }

    pub fn cancel_with(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn wait<C>(&mut self, check: &mut C) -> Result<PollOutcome, WaitError>
    where
        C: ReadinessCheck + ?Sized,
    {
        let start = Instant::now();
        let mut attempt = 0u32;

        loop {
            if self.cancelled() {
                warn!("wait for {} cancelled", check.describe());
                return Ok(PollOutcome::TimedOut);
            }

            attempt += 1;
            if check.is_ready().map_err(WaitError::Check)? {
                trace!("{} ready after {attempt} checks", check.describe());
                return Ok(PollOutcome::Ready);
            }

            let elapsed = start.elapsed();
            if elapsed >= self.config.timeout {
                debug!(
                    "{} not ready after {attempt} checks ({:.1}s)",
                    check.describe(),
                    elapsed.as_secs_f64()
                );
                return Ok(PollOutcome::TimedOut);
            }

            let remaining = self.config.timeout - elapsed;
            if let Some(notify) = self.on_attempt.as_mut() {
                notify(&Attempt {
                    number: attempt,
                    elapsed,
                    remaining,
                });
            }

            // last evaluation lands on the deadline rather than past it
            let pause = self.config.interval.min(remaining);
            match &self.cancel {
                Some(token) => {
                    if token.sleep(pause) {
                        warn!("wait for {} cancelled", check.describe());
                        return Ok(PollOutcome::TimedOut);
                    }
                }
                None => std::thread::sleep(pause),
            }
        }
    }

    fn cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|c| c.is_cancelled())
    }
}

/// Poll `check` until it reports ready or `config.timeout` has elapsed.
pub fn wait_until_ready<C>(mut check: C, config: WaitConfig) -> Result<PollOutcome, WaitError>
where
    C: ReadinessCheck,
{
    Waiter::new(config).wait(&mut check)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use pretty_assertions::assert_eq;

    fn sequence(results: Vec<Result<bool>>) -> (impl FnMut() -> Result<bool>, Arc<Mutex<u32>>) {
        let calls = Arc::new(Mutex::new(0u32));
        let counter = calls.clone();
        let mut results = results.into_iter();
        let check = move || {
            *counter.lock().unwrap() += 1;
            results.next().unwrap_or(Ok(false))
        };
        (check, calls)
    }

    #[test]
    fn zero_interval_is_rejected() {
        let err = WaitConfig::new(Duration::ZERO, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, WaitError::InvalidConfig(_)));
    }

    #[test]
    fn zero_timeout_is_allowed() {
        let config = WaitConfig::new(Duration::from_secs(1), Duration::ZERO).unwrap();
        assert_eq!(config.timeout(), Duration::ZERO);
    }

    #[test]
    fn zero_timeout_checks_exactly_once() {
        let (check, calls) = sequence(vec![Ok(false)]);
        let config = WaitConfig::new(Duration::from_secs(10), Duration::ZERO).unwrap();

        let start = Instant::now();
        let outcome = wait_until_ready(check, config).unwrap();

        assert_eq!(outcome, PollOutcome::TimedOut);
        assert_eq!(*calls.lock().unwrap(), 1);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn ready_on_first_check_does_not_sleep() {
        let (check, calls) = sequence(vec![Ok(true)]);
        let config = WaitConfig::from_secs(10, 60).unwrap();

        let start = Instant::now();
        let outcome = wait_until_ready(check, config).unwrap();

        assert_eq!(outcome, PollOutcome::Ready);
        assert_eq!(*calls.lock().unwrap(), 1);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn error_on_third_check_propagates() {
        let (check, calls) = sequence(vec![Ok(false), Ok(false), Err(anyhow!("kubectl exploded"))]);
        let config = WaitConfig::new(Duration::from_millis(10), Duration::from_secs(5)).unwrap();

        let err = wait_until_ready(check, config).unwrap_err();

        assert!(matches!(err, WaitError::Check(_)));
        assert!(err.to_string().contains("kubectl exploded"));
        assert_eq!(*calls.lock().unwrap(), 3);
    }

    #[test]
    fn attempts_are_reported_between_checks() {
        let (mut check, _) = sequence(vec![Ok(false), Ok(false), Ok(true)]);
        let config = WaitConfig::new(Duration::from_millis(10), Duration::from_secs(5)).unwrap();

        let mut seen = vec![];
        let outcome = Waiter::new(config)
            .on_attempt(|a| seen.push(a.number))
            .wait(&mut check)
            .unwrap();

        assert_eq!(outcome, PollOutcome::Ready);
        assert_eq!(seen, vec![1, 2]);
    }

    #[test]
    fn cancelled_token_stops_wait_immediately() {
        let token = CancelToken::new();
        let canceller = token.clone();
        let config = WaitConfig::from_secs(1, 60).unwrap();

        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(100));
            canceller.cancel();
        });

        let start = Instant::now();
        let outcome = Waiter::new(config)
            .cancel_with(token)
            .wait(&mut || -> Result<bool> { Ok(false) })
            .unwrap();

        assert_eq!(outcome, PollOutcome::TimedOut);
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn pre_cancelled_token_never_evaluates() {
        let token = CancelToken::new();
        token.cancel();
        let (mut check, calls) = sequence(vec![Ok(true)]);

        let outcome = Waiter::new(WaitConfig::from_secs(1, 5).unwrap())
            .cancel_with(token)
            .wait(&mut check)
            .unwrap();

        assert_eq!(outcome, PollOutcome::TimedOut);
        assert_eq!(*calls.lock().unwrap(), 0);
    }
}
