// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Circuit Breaker
//!
//! Per-particle failure isolation state machine.
//!
//! | State | Call | Outcome |
//! |-------|------|---------|
//! | Closed | admitted | failure: `consecutive_failures += 1`, at threshold → Open; success: reset |
//! | Open | rejected until `recovery_timeout` elapsed, then → HalfOpen | - |
//! | HalfOpen | at most `half_open_max_requests` admitted | failure → Open; cap of successes → Closed |
//!
//! Every transition happens under one mutex, so concurrent callers never
//! observe an intermediate state.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    #[serde(default = "default_recovery_timeout", with = "humantime_serde")]
    pub recovery_timeout: Duration,

    #[serde(default = "default_half_open_max_requests")]
    pub half_open_max_requests: u32,
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_recovery_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_half_open_max_requests() -> u32 {
    3
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            recovery_timeout: default_recovery_timeout(),
            half_open_max_requests: default_half_open_max_requests(),
        }
    }
}

/// Point-in-time view of a breaker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerState {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub opened_at: Option<DateTime<Utc>>,
    /// Successful trial calls since entering HalfOpen.
    pub half_open_trials: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Circuit for {name} is open, retry in {retry_after:?}")]
pub struct CircuitOpenError {
    pub name: String,
    pub retry_after: Duration,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    consecutive_failures: u32,
    half_open_trials: u32,
    half_open_admitted: u32,
    /// Bumped on every state change; outcomes of calls admitted under an
    /// older generation are ignored.
    generation: u64,
    opened_at: Option<(Instant, DateTime<Utc>)>,
    half_open_since: Option<Instant>,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<Inner>,
}

/// Admission for one call. Report the outcome with [`success`] or
/// [`failure`]; a permit dropped without a report (the call panicked or was
/// cancelled) counts as a failure.
///
/// [`success`]: CircuitPermit::success
/// [`failure`]: CircuitPermit::failure
#[must_use = "report the call outcome through the permit"]
#[derive(Debug)]
pub struct CircuitPermit<'a> {
    breaker: &'a CircuitBreaker,
    generation: u64,
    settled: bool,
}

impl CircuitPermit<'_> {
    pub fn success(mut self) {
        self.settled = true;
        self.breaker.settle(self.generation, true);
    }

    pub fn failure(mut self) {
        self.settled = true;
        self.breaker.settle(self.generation, false);
    }
}

impl Drop for CircuitPermit<'_> {
    fn drop(&mut self) {
        if !self.settled {
            warn!(particle = %self.breaker.name, "Admitted call abandoned without an outcome");
            self.breaker.settle(self.generation, false);
        }
    }
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                half_open_trials: 0,
                half_open_admitted: 0,
                generation: 0,
                opened_at: None,
                half_open_since: None,
            }),
        }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Ask permission to run one call. Moves Open → HalfOpen once the
    /// recovery timeout has elapsed. Trials that have not reported within
    /// `recovery_timeout` of entering HalfOpen reopen the circuit.
    pub fn try_acquire(&self) -> Result<CircuitPermit<'_>, CircuitOpenError> {
        let mut inner = self.inner.lock();

        if inner.state == CircuitState::Open {
            let elapsed = inner
                .opened_at
                .map(|(at, _)| at.elapsed())
                .unwrap_or(self.config.recovery_timeout);

            if elapsed < self.config.recovery_timeout {
                return Err(self.open_error(self.config.recovery_timeout - elapsed));
            }

            inner.state = CircuitState::HalfOpen;
            inner.half_open_trials = 0;
            inner.half_open_admitted = 0;
            inner.half_open_since = Some(Instant::now());
            inner.generation += 1;
            info!(particle = %self.name, "Circuit half-open, admitting trial calls");
        }

        if inner.state == CircuitState::HalfOpen && inner.half_open_admitted >= self.config.half_open_max_requests {
            let stale = inner
                .half_open_since
                .is_some_and(|since| since.elapsed() >= self.config.recovery_timeout);
            if stale {
                warn!(particle = %self.name, "Half-open trials never reported, reopening");
                self.open(&mut inner);
                return Err(self.open_error(self.config.recovery_timeout));
            }
            return Err(self.open_error(Duration::ZERO));
        }

        if inner.state == CircuitState::HalfOpen {
            inner.half_open_admitted += 1;
        }

        Ok(CircuitPermit {
            breaker: self,
            generation: inner.generation,
            settled: false,
        })
    }

    /// Record a success against the current state.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        self.apply_success(&mut inner);
    }

    /// Record a failure against the current state.
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        self.apply_failure(&mut inner);
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    pub fn snapshot(&self) -> CircuitBreakerState {
        let inner = self.inner.lock();
        CircuitBreakerState {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            opened_at: inner.opened_at.map(|(_, at)| at),
            half_open_trials: inner.half_open_trials,
        }
    }

    fn settle(&self, generation: u64, success: bool) {
        let mut inner = self.inner.lock();
        // admitted before the last transition, finished late
        if inner.generation != generation {
            return;
        }
        if success {
            self.apply_success(&mut inner);
        } else {
            self.apply_failure(&mut inner);
        }
    }

    fn apply_success(&self, inner: &mut Inner) {
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures = 0;
            }
            CircuitState::HalfOpen => {
                inner.half_open_trials += 1;
                if inner.half_open_trials >= self.config.half_open_max_requests {
                    inner.state = CircuitState::Closed;
                    inner.consecutive_failures = 0;
                    inner.half_open_trials = 0;
                    inner.half_open_admitted = 0;
                    inner.half_open_since = None;
                    inner.opened_at = None;
                    inner.generation += 1;
                    info!(particle = %self.name, "Circuit closed");
                }
            }
            CircuitState::Open => {}
        }
    }

    fn apply_failure(&self, inner: &mut Inner) {
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    self.open(inner);
                }
            }
            CircuitState::HalfOpen => {
                inner.consecutive_failures += 1;
                self.open(inner);
            }
            CircuitState::Open => {}
        }
    }

    fn open_error(&self, retry_after: Duration) -> CircuitOpenError {
        CircuitOpenError {
            name: self.name.clone(),
            retry_after,
        }
    }

    fn open(&self, inner: &mut Inner) {
        inner.state = CircuitState::Open;
        inner.opened_at = Some((Instant::now(), Utc::now()));
        inner.half_open_trials = 0;
        inner.half_open_admitted = 0;
        inner.half_open_since = None;
        inner.generation += 1;
        metrics::counter!("corpus_breaker_opened_total").increment(1);
        warn!(
            particle = %self.name,
            consecutive_failures = inner.consecutive_failures,
            "Circuit opened"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(threshold: u32, timeout: Duration) -> CircuitBreaker {
        CircuitBreaker::new(
            "test",
            CircuitBreakerConfig {
                failure_threshold: threshold,
                recovery_timeout: timeout,
                half_open_max_requests: 3,
            },
        )
    }

    #[test]
    fn test_opens_at_threshold() {
        let cb = breaker(3, Duration::from_secs(60));

        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);

        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(cb.snapshot().opened_at.is_some());

        let err = cb.try_acquire().unwrap_err();
        assert!(err.retry_after > Duration::ZERO);
    }

    #[test]
    fn test_success_resets_failure_count() {
        let cb = breaker(3, Duration::from_secs(60));

        cb.record_failure();
        cb.record_failure();
        cb.record_success();

        let snapshot = cb.snapshot();
        assert_eq!(snapshot.consecutive_failures, 0);
        assert_eq!(snapshot.state, CircuitState::Closed);
    }

    #[test]
    fn test_half_open_closes_after_trial_successes() {
        let cb = breaker(2, Duration::from_millis(10));
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);

        std::thread::sleep(Duration::from_millis(20));

        for _ in 0..3 {
            let permit = cb.try_acquire().unwrap();
            assert_eq!(cb.state(), CircuitState::HalfOpen);
            permit.success();
        }

        let snapshot = cb.snapshot();
        assert_eq!(snapshot.state, CircuitState::Closed);
        assert_eq!(snapshot.consecutive_failures, 0);
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let cb = breaker(1, Duration::from_millis(10));
        cb.record_failure();
        let first_open = cb.snapshot().opened_at.unwrap();

        std::thread::sleep(Duration::from_millis(20));
        cb.try_acquire().unwrap().failure();

        let snapshot = cb.snapshot();
        assert_eq!(snapshot.state, CircuitState::Open);
        assert!(snapshot.opened_at.unwrap() >= first_open);
        assert!(cb.try_acquire().is_err());
    }

    #[test]
    fn test_half_open_limits_concurrent_trials() {
        let cb = breaker(1, Duration::from_millis(5));
        cb.record_failure();
        std::thread::sleep(Duration::from_millis(10));

        let _first = cb.try_acquire().unwrap();
        let _second = cb.try_acquire().unwrap();
        let _third = cb.try_acquire().unwrap();
        assert!(cb.try_acquire().is_err());
    }

    #[test]
    fn test_dropped_permit_counts_as_failure() {
        let cb = breaker(1, Duration::from_millis(5));
        cb.record_failure();
        std::thread::sleep(Duration::from_millis(10));

        let permit = cb.try_acquire().unwrap();
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        drop(permit);

        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn test_unreported_trials_reopen_after_recovery_timeout() {
        let cb = breaker(1, Duration::from_millis(20));
        cb.record_failure();
        std::thread::sleep(Duration::from_millis(30));

        // trials admitted but never reported, e.g. a worker that hangs
        let hung: Vec<_> = (0..3).map(|_| cb.try_acquire().unwrap()).collect();
        let err = cb.try_acquire().unwrap_err();
        assert_eq!(err.retry_after, Duration::ZERO);
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        std::thread::sleep(Duration::from_millis(30));
        let err = cb.try_acquire().unwrap_err();
        assert_eq!(err.retry_after, Duration::from_millis(20));
        assert_eq!(cb.state(), CircuitState::Open);

        // the next recovery window admits fresh trials and recovers
        std::thread::sleep(Duration::from_millis(30));
        for _ in 0..3 {
            cb.try_acquire().unwrap().success();
        }
        assert_eq!(cb.state(), CircuitState::Closed);

        // stale permits from the abandoned window do not disturb the closed circuit
        drop(hung);
        let snapshot = cb.snapshot();
        assert_eq!(snapshot.state, CircuitState::Closed);
        assert_eq!(snapshot.consecutive_failures, 0);
    }

    #[test]
    fn test_late_outcome_from_closed_call_is_ignored_in_half_open() {
        let cb = breaker(1, Duration::from_millis(5));
        let slow = cb.try_acquire().unwrap();
        cb.record_failure();
        std::thread::sleep(Duration::from_millis(10));

        let trial = cb.try_acquire().unwrap();
        slow.success();
        assert_eq!(cb.snapshot().half_open_trials, 0);

        trial.success();
        assert_eq!(cb.snapshot().half_open_trials, 1);
    }

    #[test]
    fn test_config_defaults() {
        let config = CircuitBreakerConfig::default();
        assert_eq!(config.failure_threshold, 5);
        assert_eq!(config.recovery_timeout, Duration::from_secs(60));
        assert_eq!(config.half_open_max_requests, 3);
    }
}
