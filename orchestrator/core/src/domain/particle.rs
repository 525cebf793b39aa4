// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Particle Domain
//!
//! A particle is a single-responsibility worker wrapped with failure
//! isolation. This module holds the pieces that do not depend on the bus:
//!
//! - [`DomainWorker`]: the business-logic contract a particle executes
//! - [`ParticleState`]: persisted counters, mutated only by Memorize
//! - [`ActionResult`]: what a particle publishes back for one action

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use tracing::warn;

use crate::domain::message::{CorrelationId, SubscriberId};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParticleId(pub String);

impl ParticleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Particles subscribe to the bus under their own id.
    pub fn subscriber_id(&self) -> SubscriberId {
        SubscriberId(self.0.clone())
    }
}

impl fmt::Display for ParticleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Raw output of a worker's `execute`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerOutcome {
    pub success: bool,
    pub output: serde_json::Value,
    pub error: Option<String>,
}

impl WorkerOutcome {
    pub fn ok(output: serde_json::Value) -> Self {
        Self {
            success: true,
            output,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            output: serde_json::Value::Null,
            error: Some(error.into()),
        }
    }
}

/// A custom metric a worker tracks, with the value it starts from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDeclaration {
    pub name: String,
    pub initial: f64,
}

impl MetricDeclaration {
    pub fn new(name: impl Into<String>, initial: f64) -> Self {
        Self {
            name: name.into(),
            initial,
        }
    }
}

/// Business logic executed by a particle.
///
/// Implementations must be safe to call concurrently: a particle runs every
/// addressed action in its own task.
#[async_trait]
pub trait DomainWorker: Send + Sync {
    /// Particle id the worker is registered under.
    fn kind(&self) -> &str;

    async fn execute(&self, parameters: &serde_json::Value) -> WorkerOutcome;

    /// Score in `[0, 1]`. Binary unless overridden.
    fn evaluate(&self, outcome: &WorkerOutcome) -> f64 {
        if outcome.success {
            1.0
        } else {
            0.0
        }
    }

    fn declared_metrics(&self) -> Vec<MetricDeclaration> {
        Vec::new()
    }

    /// Additive deltas applied to declared metrics after each cycle.
    fn metric_updates(&self, _outcome: &WorkerOutcome) -> Vec<(String, f64)> {
        Vec::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionErrorKind {
    /// The action never reached its particle.
    Dispatch,
    /// The worker ran and reported failure.
    Execution,
    /// No result arrived before the deadline.
    Timeout,
    /// The particle's breaker refused the call.
    CircuitOpen,
}

impl ActionErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionErrorKind::Dispatch => "dispatch",
            ActionErrorKind::Execution => "execution",
            ActionErrorKind::Timeout => "timeout",
            ActionErrorKind::CircuitOpen => "circuit_open",
        }
    }
}

impl fmt::Display for ActionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionError {
    pub kind: ActionErrorKind,
    pub message: String,
}

impl ActionError {
    pub fn new(kind: ActionErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for ActionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub correlation_id: CorrelationId,
    pub particle_id: ParticleId,
    pub success: bool,
    pub output: serde_json::Value,
    pub error: Option<ActionError>,
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    pub score: f64,
}

impl ActionResult {
    pub fn from_outcome(
        correlation_id: CorrelationId,
        particle_id: ParticleId,
        outcome: WorkerOutcome,
        score: f64,
        duration: Duration,
    ) -> Self {
        let error = if outcome.success {
            None
        } else {
            Some(ActionError::new(
                ActionErrorKind::Execution,
                outcome.error.unwrap_or_else(|| "worker reported failure".to_string()),
            ))
        };

        Self {
            correlation_id,
            particle_id,
            success: outcome.success,
            output: outcome.output,
            error,
            duration,
            score: score.clamp(0.0, 1.0),
        }
    }

    /// Failed result that never reached (or was refused by) the worker.
    pub fn failure(
        correlation_id: CorrelationId,
        particle_id: ParticleId,
        error: ActionError,
        duration: Duration,
    ) -> Self {
        Self {
            correlation_id,
            particle_id,
            success: false,
            output: serde_json::Value::Null,
            error: Some(error),
            duration,
            score: 0.0,
        }
    }

    pub fn error_kind(&self) -> Option<ActionErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }
}

/// Persisted per-particle counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticleState {
    pub particle_id: ParticleId,
    /// Never decreases, survives restarts.
    pub cycle_count: u64,
    pub total_executions: u64,
    pub successes: u64,
    pub failures: u64,
    #[serde(default)]
    pub custom_metrics: BTreeMap<String, f64>,
    #[serde(default)]
    pub last_score: Option<f64>,
    pub updated_at: DateTime<Utc>,
}

impl ParticleState {
    pub fn new(particle_id: ParticleId, declared: &[MetricDeclaration]) -> Self {
        let mut state = Self {
            particle_id,
            cycle_count: 0,
            total_executions: 0,
            successes: 0,
            failures: 0,
            custom_metrics: BTreeMap::new(),
            last_score: None,
            updated_at: Utc::now(),
        };
        state.declare_metrics(declared);
        state
    }

    /// Seed declared metrics that are not yet present. Existing values
    /// (e.g. restored from disk) are kept.
    pub fn declare_metrics(&mut self, declared: &[MetricDeclaration]) {
        for metric in declared {
            self.custom_metrics
                .entry(metric.name.clone())
                .or_insert(metric.initial);
        }
    }

    /// Memorize one completed cycle.
    pub fn record_cycle(&mut self, success: bool, score: f64, updates: &[(String, f64)]) {
        self.cycle_count += 1;
        self.total_executions += 1;
        if success {
            self.successes += 1;
        } else {
            self.failures += 1;
        }
        self.last_score = Some(score);

        for (name, delta) in updates {
            match self.custom_metrics.get_mut(name) {
                Some(value) => *value += delta,
                None => warn!(
                    particle = %self.particle_id,
                    metric = %name,
                    "Ignoring update to undeclared metric"
                ),
            }
        }

        self.updated_at = Utc::now();
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_executions == 0 {
            0.0
        } else {
            self.successes as f64 / self.total_executions as f64
        }
    }
}
