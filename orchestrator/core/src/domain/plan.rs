// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Requests, plans and the actions they expand into.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::message::CorrelationId;
use crate::domain::particle::ParticleId;

pub const DEFAULT_ACTION_PRIORITY: u8 = 5;

/// A high-level request submitted to the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub kind: String,
    #[serde(default = "empty_object")]
    pub parameters: serde_json::Value,
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

impl Request {
    pub fn new(kind: impl Into<String>, parameters: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            parameters,
        }
    }

    pub fn str_param(&self, name: &str) -> Result<&str, PlanningError> {
        self.parameters
            .get(name)
            .and_then(|v| v.as_str())
            .ok_or_else(|| PlanningError::MissingParameter {
                kind: self.kind.clone(),
                parameter: name.to_string(),
            })
    }

    pub fn array_param(&self, name: &str) -> Result<&Vec<serde_json::Value>, PlanningError> {
        self.parameters
            .get(name)
            .and_then(|v| v.as_array())
            .ok_or_else(|| PlanningError::MissingParameter {
                kind: self.kind.clone(),
                parameter: name.to_string(),
            })
    }
}

/// Template output: what to run, before correlation ids are assigned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionSpec {
    pub target: ParticleId,
    pub parameters: serde_json::Value,
    pub priority: u8,
}

impl ActionSpec {
    pub fn new(target: impl Into<String>, parameters: serde_json::Value) -> Self {
        Self {
            target: ParticleId::new(target),
            parameters,
            priority: DEFAULT_ACTION_PRIORITY,
        }
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }
}

/// One dispatchable unit. Immutable once dispatched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub target_particle: ParticleId,
    pub parameters: serde_json::Value,
    pub priority: u8,
    pub correlation_id: CorrelationId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub request_kind: String,
    pub actions: Vec<Action>,
}

impl Plan {
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

/// Planning failed: nothing was dispatched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanningError {
    #[error("Unknown request kind: {0}")]
    UnknownKind(String),

    #[error("Request '{kind}' is missing parameter '{parameter}'")]
    MissingParameter { kind: String, parameter: String },

    #[error("Request '{kind}' targets unregistered particle '{particle}'")]
    UnknownParticle { kind: String, particle: String },

    #[error("Request '{0}' expanded to an empty plan")]
    EmptyPlan(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parameter_accessors() {
        let request = Request::new("write_file", json!({"path": "a.txt", "files": []}));

        assert_eq!(request.str_param("path").unwrap(), "a.txt");
        assert!(request.array_param("files").unwrap().is_empty());
        assert_eq!(
            request.str_param("content"),
            Err(PlanningError::MissingParameter {
                kind: "write_file".into(),
                parameter: "content".into()
            })
        );
        // wrong type counts as missing
        assert!(request.array_param("path").is_err());
    }

    #[test]
    fn test_request_parameters_default_to_empty_object() {
        let request: Request = serde_json::from_str(r#"{"kind": "echo"}"#).unwrap();
        assert!(request.parameters.as_object().unwrap().is_empty());
    }
}
