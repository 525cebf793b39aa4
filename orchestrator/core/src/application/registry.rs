// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Typed registry of domain workers, consulted at plan time.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::domain::particle::{DomainWorker, ParticleId};

#[derive(Clone, Default)]
pub struct WorkerRegistry {
    workers: BTreeMap<ParticleId, Arc<dyn DomainWorker>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register under the worker's own kind. Replaces an earlier worker of
    /// the same kind.
    pub fn register(&mut self, worker: Arc<dyn DomainWorker>) -> &mut Self {
        self.workers.insert(ParticleId::new(worker.kind()), worker);
        self
    }

    pub fn with(mut self, worker: Arc<dyn DomainWorker>) -> Self {
        self.register(worker);
        self
    }

    pub fn get(&self, id: &ParticleId) -> Option<Arc<dyn DomainWorker>> {
        self.workers.get(id).cloned()
    }

    pub fn contains(&self, id: &ParticleId) -> bool {
        self.workers.contains_key(id)
    }

    pub fn ids(&self) -> Vec<ParticleId> {
        self.workers.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ParticleId, &Arc<dyn DomainWorker>)> {
        self.workers.iter()
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}

impl FromIterator<Arc<dyn DomainWorker>> for WorkerRegistry {
    fn from_iter<I: IntoIterator<Item = Arc<dyn DomainWorker>>>(iter: I) -> Self {
        let mut registry = Self::new();
        for worker in iter {
            registry.register(worker);
        }
        registry
    }
}
