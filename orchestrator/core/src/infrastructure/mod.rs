// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod message_bus;
pub mod repositories;
pub mod workers;

pub use message_bus::{BusBalance, BusError, MessageBus, Subscription, SubscriptionStats};
pub use repositories::{InMemoryParticleStateRepository, JsonFileParticleStateRepository};
pub use workers::{builtin_workers, EchoWorker, FileReaderWorker, FileWriterWorker, Workspace, WorkspacePathError};
