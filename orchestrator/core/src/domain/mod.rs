// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain types for the Corpus runtime
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Messages, particles, plans, synthesis and configuration,
//!   free of bus and task plumbing

pub mod circuit_breaker;
pub mod config;
pub mod message;
pub mod particle;
pub mod plan;
pub mod repository;
pub mod synthesis;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerState, CircuitOpenError, CircuitPermit, CircuitState,
};
pub use config::{BusConfig, ConfigError, CorpusConfig, LearningConfig, OrchestratorConfig, PersistenceConfig};
pub use message::{
    BackpressurePolicy, CorrelationId, DeliveryReport, DispatchError, Message, MessageId, MessagePayload, Partition,
    SubscriberId,
};
pub use particle::{
    ActionError, ActionErrorKind, ActionResult, DomainWorker, MetricDeclaration, ParticleId, ParticleState,
    WorkerOutcome,
};
pub use plan::{Action, ActionSpec, Plan, PlanningError, Request, DEFAULT_ACTION_PRIORITY};
pub use repository::{ParticleStateRepository, RepositoryError};
pub use synthesis::{detect_shapes, SynthesisResult};
