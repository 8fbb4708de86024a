use anyhow::{bail, Result};
use pretty_assertions::assert_eq;
use std::thread;
use std::time::{Duration, Instant};

use kindstack::readiness::{
    wait_until_ready, CancelToken, PollOutcome, WaitConfig, WaitError, Waiter,
};

fn config(interval_ms: u64, timeout_ms: u64) -> WaitConfig {
    WaitConfig::new(
        Duration::from_millis(interval_ms),
        Duration::from_millis(timeout_ms),
    )
    .unwrap()
}

/// Check that answers from `script` in order, then keeps the last answer.
fn scripted(script: Vec<bool>, calls: &mut u32) -> impl FnMut() -> Result<bool> + '_ {
    move || {
        *calls += 1;
        let idx = (*calls as usize - 1).min(script.len() - 1);
        Ok(script[idx])
    }
}

#[test]
fn always_false_times_out_after_five_seconds() {
    let mut calls = 0;
    let start = Instant::now();
    let outcome =
        wait_until_ready(scripted(vec![false], &mut calls), WaitConfig::from_secs(1, 5).unwrap())
            .unwrap();
    let elapsed = start.elapsed();

    assert_eq!(outcome, PollOutcome::TimedOut);
    assert!(elapsed >= Duration::from_secs(5), "{elapsed:?}");
    assert!(elapsed < Duration::from_secs(6), "{elapsed:?}");
    assert!((5..=6).contains(&calls), "{calls} evaluations");
}

#[test]
fn ready_on_third_evaluation_after_four_seconds() {
    let mut calls = 0;
    let start = Instant::now();
    let outcome = wait_until_ready(
        scripted(vec![false, false, true], &mut calls),
        WaitConfig::from_secs(2, 30).unwrap(),
    )
    .unwrap();
    let elapsed = start.elapsed();

    assert_eq!(outcome, PollOutcome::Ready);
    assert_eq!(calls, 3);
    assert!(elapsed >= Duration::from_secs(4), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(4500), "{elapsed:?}");
}

#[test]
fn ready_after_k_evaluations() {
    for k in 1..=4usize {
        let mut script = vec![false; k - 1];
        script.push(true);

        let mut calls = 0;
        let start = Instant::now();
        let outcome = wait_until_ready(scripted(script, &mut calls), config(20, 1000)).unwrap();
        let elapsed = start.elapsed();

        assert_eq!(outcome, PollOutcome::Ready);
        assert_eq!(calls as usize, k);
        assert!(elapsed >= Duration::from_millis(20 * (k as u64 - 1)));
    }
}

#[test]
fn never_ready_stays_within_one_interval_of_timeout() {
    let mut calls = 0;
    let start = Instant::now();
    let outcome = wait_until_ready(scripted(vec![false], &mut calls), config(30, 100)).unwrap();
    let elapsed = start.elapsed();

    assert_eq!(outcome, PollOutcome::TimedOut);
    assert!(elapsed >= Duration::from_millis(100), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(130 + 50), "{elapsed:?}");
}

#[test]
fn zero_timeout_checks_once_without_sleeping() {
    let mut calls = 0;
    let start = Instant::now();
    let outcome = wait_until_ready(scripted(vec![false], &mut calls), config(1000, 0)).unwrap();

    assert_eq!(outcome, PollOutcome::TimedOut);
    assert_eq!(calls, 1);
    assert!(start.elapsed() < Duration::from_millis(500));
}

#[test]
fn error_on_third_evaluation_is_propagated() {
    let mut calls = 0;
    let check = || -> Result<bool> {
        calls += 1;
        if calls == 3 {
            bail!("cluster unreachable");
        }
        Ok(false)
    };

    let err = wait_until_ready(check, config(5, 1000)).unwrap_err();

    assert!(matches!(err, WaitError::Check(_)));
    assert!(err.to_string().contains("cluster unreachable"));
    assert_eq!(calls, 3);
}

#[test]
fn zero_interval_is_rejected() {
    let err = WaitConfig::new(Duration::ZERO, Duration::from_secs(1)).unwrap_err();
    assert!(matches!(err, WaitError::InvalidConfig(_)));
}

#[test]
fn cancellation_from_another_thread() {
    let token = CancelToken::new();
    let canceller = token.clone();
    let handle = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        canceller.cancel();
    });

    let start = Instant::now();
    let outcome = Waiter::new(config(1000, 60_000))
        .cancel_with(token)
        .wait(&mut || -> Result<bool> { Ok(false) })
        .unwrap();
    handle.join().unwrap();

    assert_eq!(outcome, PollOutcome::TimedOut);
    assert!(start.elapsed() < Duration::from_secs(1));
}

#[test]
fn notifications_do_not_change_the_result() {
    let mut seen = vec![];
    let mut calls = 0;
    let outcome = Waiter::new(config(5, 1000))
        .on_attempt(|attempt| seen.push(attempt.number))
        .wait(&mut scripted(vec![false, false, true], &mut calls))
        .unwrap();

    assert_eq!(outcome, PollOutcome::Ready);
    assert_eq!(seen, vec![1, 2]);
}
