// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # `corpus-orchestrator-core`
//!
//! Particle runtime: a partitioned broadcast bus, failure-isolated particles
//! and an orchestrator that plans, dispatches, collects and synthesizes.
//!
//! | Module | Layer | Contents |
//! |--------|-------|----------|
//! | [`domain`] | Domain | messages, circuit breaker, particle state, plans, synthesis, config |
//! | [`application`] | Application | `Planner`, `Particle`, `Orchestrator`, `WorkerRegistry` |
//! | [`infrastructure`] | Infrastructure | `MessageBus`, state repositories, built-in workers |
//! | [`runtime`] | Wiring | `CorpusRuntime`, `RuntimeBuilder` |

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod runtime;

pub use domain::*;
pub use runtime::{CorpusRuntime, RuntimeBuilder};
