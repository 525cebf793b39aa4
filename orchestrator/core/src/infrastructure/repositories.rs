// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! `ParticleStateRepository` implementations.
//!
//! `JsonFileParticleStateRepository` keeps one JSON document per particle and
//! replaces it through a temporary file plus rename, so a crash mid-write
//! leaves the previous state intact.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::domain::particle::{ParticleId, ParticleState};
use crate::domain::repository::{ParticleStateRepository, RepositoryError};

#[derive(Clone, Default)]
pub struct InMemoryParticleStateRepository {
    states: Arc<RwLock<HashMap<ParticleId, ParticleState>>>,
}

impl InMemoryParticleStateRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ParticleStateRepository for InMemoryParticleStateRepository {
    async fn save(&self, state: &ParticleState) -> Result<(), RepositoryError> {
        self.states.write().insert(state.particle_id.clone(), state.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &ParticleId) -> Result<Option<ParticleState>, RepositoryError> {
        Ok(self.states.read().get(id).cloned())
    }

    async fn list_all(&self) -> Result<Vec<ParticleState>, RepositoryError> {
        let mut states: Vec<_> = self.states.read().values().cloned().collect();
        states.sort_by(|a, b| a.particle_id.cmp(&b.particle_id));
        Ok(states)
    }
}

#[derive(Debug, Clone)]
pub struct JsonFileParticleStateRepository {
    dir: PathBuf,
}

impl JsonFileParticleStateRepository {
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, RepositoryError> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &ParticleId) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(id.as_str())))
    }
}

/// Particle ids are free-form; keep file names portable.
fn file_stem(id: &str) -> String {
    let mut stem = String::with_capacity(id.len());
    for byte in id.bytes() {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'_' | b'-' => stem.push(byte as char),
            other => stem.push_str(&format!("%{:02X}", other)),
        }
    }
    stem
}

#[async_trait]
impl ParticleStateRepository for JsonFileParticleStateRepository {
    async fn save(&self, state: &ParticleState) -> Result<(), RepositoryError> {
        let path = self.path_for(&state.particle_id);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_vec_pretty(state)?;
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn find_by_id(&self, id: &ParticleId) -> Result<Option<ParticleState>, RepositoryError> {
        match tokio::fs::read(self.path_for(id)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_all(&self) -> Result<Vec<ParticleState>, RepositoryError> {
        let mut states = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let bytes = tokio::fs::read(&path).await?;
            states.push(serde_json::from_slice::<ParticleState>(&bytes)?);
        }
        states.sort_by(|a, b| a.particle_id.cmp(&b.particle_id));
        Ok(states)
    }
}
