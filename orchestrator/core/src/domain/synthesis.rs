// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Synthesis
//!
//! Aggregates the results of one plan and scans them for recurring
//! execution shapes.
//!
//! | Kind | Rule | entropy_reduction |
//! |------|------|-------------------|
//! | optimization | run of ≥3 consecutive actions on a batchable particle | `1 - 1/n` |
//! | sequence | run of ≥3 consecutive actions on any other particle | `1 - 1/n` |
//! | error | ≥2 failures sharing an error kind | `count / failures` |
//! | composition | every action succeeded, ≥2 distinct particles | `1 - distinct/total` |
//! | structural | plan of ≥2 actions | `1 - 1/len` |

use corpus_cortex::{PatternKind, PatternShape};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::domain::message::CorrelationId;
use crate::domain::particle::{ActionErrorKind, ActionResult, ParticleId};

const MIN_RUN_LENGTH: usize = 3;
const MIN_ERROR_CLUSTER: usize = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisResult {
    pub request_kind: String,
    pub overall_success: bool,
    pub success_rate: f64,
    pub total: usize,
    pub succeeded: Vec<CorrelationId>,
    pub failed: Vec<CorrelationId>,
    /// In plan order.
    pub results: Vec<ActionResult>,
    pub patterns: Vec<PatternShape>,
    #[serde(with = "humantime_serde")]
    pub elapsed: Duration,
}

impl SynthesisResult {
    /// `results` must be in plan order.
    pub fn synthesize(
        request_kind: &str,
        results: Vec<ActionResult>,
        batchable: &[String],
        elapsed: Duration,
    ) -> Self {
        let total = results.len();
        let (succeeded, failed): (Vec<_>, Vec<_>) = results.iter().partition(|r| r.success);
        let succeeded: Vec<CorrelationId> = succeeded.into_iter().map(|r| r.correlation_id.clone()).collect();
        let failed: Vec<CorrelationId> = failed.into_iter().map(|r| r.correlation_id.clone()).collect();

        let success_rate = if total == 0 {
            0.0
        } else {
            succeeded.len() as f64 / total as f64
        };

        let patterns = detect_shapes(request_kind, &results, batchable);

        Self {
            request_kind: request_kind.to_string(),
            overall_success: total > 0 && failed.is_empty(),
            success_rate,
            total,
            succeeded,
            failed,
            results,
            patterns,
            elapsed,
        }
    }

    pub fn result_for(&self, correlation_id: &CorrelationId) -> Option<&ActionResult> {
        self.results.iter().find(|r| &r.correlation_id == correlation_id)
    }
}

pub fn detect_shapes(request_kind: &str, results: &[ActionResult], batchable: &[String]) -> Vec<PatternShape> {
    let mut shapes = Vec::new();

    for (particle, run) in consecutive_runs(results) {
        if run.len() < MIN_RUN_LENGTH {
            continue;
        }
        let n = run.len();
        let kind = if batchable.iter().any(|b| b == particle.as_str()) {
            PatternKind::Optimization
        } else {
            PatternKind::Sequence
        };
        shapes.push(PatternShape::new(
            kind,
            format!("{} x{}", particle, n),
            1.0 - 1.0 / n as f64,
            run.iter().all(|r| r.success),
        ));
    }

    let failures: Vec<&ActionResult> = results.iter().filter(|r| !r.success).collect();
    let mut by_kind: BTreeMap<&'static str, Vec<&ParticleId>> = BTreeMap::new();
    for failure in &failures {
        let kind = failure.error_kind().unwrap_or(ActionErrorKind::Execution);
        by_kind.entry(kind.as_str()).or_default().push(&failure.particle_id);
    }
    for (kind, mut particles) in by_kind {
        if particles.len() < MIN_ERROR_CLUSTER {
            continue;
        }
        let count = particles.len();
        particles.sort();
        particles.dedup();
        let names: Vec<&str> = particles.iter().map(|p| p.as_str()).collect();
        shapes.push(PatternShape::new(
            PatternKind::Error,
            format!("{}@{}", kind, names.join(",")),
            count as f64 / failures.len() as f64,
            false,
        ));
    }

    if results.len() >= 2 && failures.is_empty() {
        let mut distinct: Vec<&str> = results.iter().map(|r| r.particle_id.as_str()).collect();
        distinct.sort_unstable();
        distinct.dedup();
        if distinct.len() >= 2 {
            shapes.push(PatternShape::new(
                PatternKind::Composition,
                distinct.join("+"),
                1.0 - distinct.len() as f64 / results.len() as f64,
                true,
            ));
        }
    }

    if results.len() >= 2 {
        let sequence: Vec<&str> = results.iter().map(|r| r.particle_id.as_str()).collect();
        shapes.push(PatternShape::new(
            PatternKind::Structural,
            format!("{}->{}", request_kind, sequence.join(",")),
            1.0 - 1.0 / results.len() as f64,
            failures.is_empty(),
        ));
    }

    shapes
}

fn consecutive_runs(results: &[ActionResult]) -> Vec<(&ParticleId, &[ActionResult])> {
    let mut runs = Vec::new();
    let mut start = 0;
    for i in 1..=results.len() {
        if i == results.len() || results[i].particle_id != results[start].particle_id {
            if start < results.len() {
                runs.push((&results[start].particle_id, &results[start..i]));
            }
            start = i;
        }
    }
    runs
}
