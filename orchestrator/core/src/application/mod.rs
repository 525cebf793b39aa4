// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod orchestrator;
pub mod particle;
pub mod planner;
pub mod registry;

pub use orchestrator::{dispatch_order, Orchestrator, OrchestratorDeps};
pub use particle::Particle;
pub use planner::{PlanTemplate, Planner};
pub use registry::WorkerRegistry;
