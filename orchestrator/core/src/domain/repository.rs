// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Repository Interfaces
//!
//! Persistence contract for [`ParticleState`], defined in the domain layer and
//! implemented in `crate::infrastructure::repositories`.
//!
//! | Trait | Aggregate | Implementations |
//! |-------|-----------|----------------|
//! | `ParticleStateRepository` | `ParticleState` | `InMemoryParticleStateRepository`, `JsonFileParticleStateRepository` |
//!
//! There is no `delete`: particle state is never removed once created.

use async_trait::async_trait;

use crate::domain::particle::{ParticleId, ParticleState};

#[async_trait]
pub trait ParticleStateRepository: Send + Sync {
    /// Create or replace the stored state atomically.
    async fn save(&self, state: &ParticleState) -> Result<(), RepositoryError>;

    async fn find_by_id(&self, id: &ParticleId) -> Result<Option<ParticleState>, RepositoryError>;

    async fn list_all(&self) -> Result<Vec<ParticleState>, RepositoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<std::io::Error> for RepositoryError {
    fn from(err: std::io::Error) -> Self {
        RepositoryError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}
