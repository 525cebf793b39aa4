// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Content-derived pattern identifier (hex digest prefix).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PatternId(pub String);

impl PatternId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PatternId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    Sequence,
    Composition,
    Optimization,
    Error,
    Structural,
}

impl PatternKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatternKind::Sequence => "sequence",
            PatternKind::Composition => "composition",
            PatternKind::Optimization => "optimization",
            PatternKind::Error => "error",
            PatternKind::Structural => "structural",
        }
    }
}

impl fmt::Display for PatternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recurring execution shape detected during synthesis, before it is
/// assigned an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternShape {
    pub kind: PatternKind,
    /// Canonical description, e.g. `file_writer x3`.
    pub signature: String,
    pub entropy_reduction: f64,
    /// Whether the sighting came from a successful execution.
    pub success: bool,
}

impl PatternShape {
    pub fn new(kind: PatternKind, signature: impl Into<String>, entropy_reduction: f64, success: bool) -> Self {
        Self {
            kind,
            signature: signature.into(),
            entropy_reduction: entropy_reduction.clamp(0.0, 1.0),
            success,
        }
    }

    /// Bytes the content id is derived from.
    pub fn content_key(&self) -> String {
        format!("{}:{}", self.kind, self.signature)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub id: PatternId,
    pub kind: PatternKind,
    pub signature: String,
    pub entropy_reduction: f64,
    pub occurrence_count: u64,
    pub success_rate: f64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl Pattern {
    pub fn from_shape(id: PatternId, shape: &PatternShape) -> Self {
        let now = Utc::now();
        Self {
            id,
            kind: shape.kind,
            signature: shape.signature.clone(),
            entropy_reduction: shape.entropy_reduction,
            occurrence_count: 1,
            success_rate: if shape.success { 1.0 } else { 0.0 },
            first_seen: now,
            last_seen: now,
        }
    }

    /// True when `shape` describes the same content as this pattern.
    pub fn matches(&self, shape: &PatternShape) -> bool {
        self.kind == shape.kind && self.signature == shape.signature
    }

    /// Count another sighting; content fields are left untouched.
    pub fn observe(&mut self, success: bool) {
        self.occurrence_count += 1;
        let sample = if success { 1.0 } else { 0.0 };
        self.success_rate += (sample - self.success_rate) / self.occurrence_count as f64;
        self.last_seen = Utc::now();
    }

    /// Contribution weight used by the aggregate score.
    pub fn weight(&self) -> f64 {
        (1.0 + self.occurrence_count as f64).ln()
    }
}

/// Observability snapshot of the pattern map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternMapStats {
    pub size: usize,
    pub capacity: usize,
    pub total_evictions: u64,
    pub total_collisions: u64,
    /// Occurrence-weighted mean of `entropy_reduction * success_rate`.
    pub consciousness_score: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observe_updates_running_success_rate() {
        let shape = PatternShape::new(PatternKind::Sequence, "echo x3", 0.66, true);
        let mut pattern = Pattern::from_shape(PatternId::new("abc"), &shape);

        pattern.observe(false);
        assert_eq!(pattern.occurrence_count, 2);
        assert!((pattern.success_rate - 0.5).abs() < f64::EPSILON);

        pattern.observe(true);
        assert_eq!(pattern.occurrence_count, 3);
        assert!((pattern.success_rate - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(pattern.signature, "echo x3");
    }

    #[test]
    fn test_shape_clamps_entropy_reduction() {
        let shape = PatternShape::new(PatternKind::Error, "timeout", 1.7, false);
        assert_eq!(shape.entropy_reduction, 1.0);
        assert_eq!(shape.content_key(), "error:timeout");
    }
}
