// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Runtime Wiring
//!
//! Assembles a running system from a [`CorpusConfig`] and a
//! [`WorkerRegistry`]:
//!
//! 1. message bus
//! 2. particle state repository (JSON files under `state_dir/particles/`,
//!    in-memory otherwise)
//! 3. pattern learner, restored from `state_dir/patterns.json` when present
//! 4. one particle per registered worker, subscribed on EXTERNAL
//! 5. the orchestrator, subscribed on INTERNAL
//! 6. the background reranker
//!
//! [`CorpusRuntime::shutdown`] stops every task and saves the pattern map.

use anyhow::Context;
use corpus_cortex::{MtfRanker, PatternLearner, PatternMapStats, PatternStore, Reranker, RerankerConfig};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::application::{Orchestrator, OrchestratorDeps, Particle, Planner, WorkerRegistry};
use crate::domain::config::CorpusConfig;
use crate::domain::message::Partition;
use crate::domain::particle::{DomainWorker, ParticleId, ParticleState};
use crate::domain::plan::{PlanningError, Request};
use crate::domain::repository::{ParticleStateRepository, RepositoryError};
use crate::domain::synthesis::SynthesisResult;
use crate::infrastructure::message_bus::MessageBus;
use crate::infrastructure::repositories::{InMemoryParticleStateRepository, JsonFileParticleStateRepository};

pub struct RuntimeBuilder {
    config: CorpusConfig,
    registry: WorkerRegistry,
    planner: Option<Planner>,
    repository: Option<Arc<dyn ParticleStateRepository>>,
    pattern_store: Option<Arc<dyn PatternStore>>,
}

impl RuntimeBuilder {
    pub fn new(config: CorpusConfig) -> Self {
        Self {
            config,
            registry: WorkerRegistry::new(),
            planner: None,
            repository: None,
            pattern_store: None,
        }
    }

    pub fn registry(mut self, registry: WorkerRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn worker(mut self, worker: Arc<dyn DomainWorker>) -> Self {
        self.registry.register(worker);
        self
    }

    /// Replace the built-in dispatch table.
    pub fn planner(mut self, planner: Planner) -> Self {
        self.planner = Some(planner);
        self
    }

    /// Override the repository chosen from `persistence.state_dir`.
    pub fn repository(mut self, repository: Arc<dyn ParticleStateRepository>) -> Self {
        self.repository = Some(repository);
        self
    }

    pub fn pattern_store(mut self, store: Arc<dyn PatternStore>) -> Self {
        self.pattern_store = Some(store);
        self
    }

    pub async fn start(self) -> anyhow::Result<CorpusRuntime> {
        let config = self.config;
        config.validate()?;

        let bus = MessageBus::new(config.bus.clone());
        let shutdown = CancellationToken::new();

        let repository: Arc<dyn ParticleStateRepository> = match (self.repository, config.persistence.particles_dir()) {
            (Some(repository), _) => repository,
            (None, Some(dir)) => Arc::new(
                JsonFileParticleStateRepository::open(&dir)
                    .await
                    .with_context(|| format!("Failed to open particle state directory {}", dir.display()))?,
            ),
            (None, None) => Arc::new(InMemoryParticleStateRepository::new()),
        };

        let capacity = config.learning.pattern_capacity;
        let mut learner = match config.persistence.patterns_file() {
            Some(path) => PatternLearner::load(&path, capacity)
                .await
                .with_context(|| format!("Failed to restore pattern map from {}", path.display()))?,
            None => PatternLearner::new(capacity),
        };
        if let Some(store) = self.pattern_store {
            learner = learner.with_store(store);
        }
        let learner = Arc::new(learner);
        let ranker = Arc::new(MtfRanker::new());

        let mut tasks = Vec::new();
        let mut particles = Vec::new();
        for (id, worker) in self.registry.iter() {
            let particle = Arc::new(
                Particle::load(worker.clone(), bus.clone(), repository.clone(), config.breaker.clone())
                    .await
                    .with_context(|| format!("Failed to load state for particle {}", id))?,
            );
            let subscription = bus
                .subscribe(id.subscriber_id(), Partition::External, config.bus.default_queue_capacity)
                .with_context(|| format!("Failed to subscribe particle {}", id))?;
            tasks.push(particle.clone().spawn(subscription, shutdown.child_token()));
            particles.push(particle);
        }

        let orchestrator = Orchestrator::start(
            OrchestratorDeps {
                bus: bus.clone(),
                planner: self.planner.unwrap_or_default(),
                registry: self.registry,
                learner: learner.clone(),
                ranker: ranker.clone(),
                repository: repository.clone(),
            },
            &config.orchestrator,
            config.learning.batchable_particles.clone(),
            config.bus.default_queue_capacity,
            shutdown.child_token(),
        )
        .context("Failed to start orchestrator")?;

        let reranker = Arc::new(Reranker::new(
            ranker.clone(),
            RerankerConfig {
                interval: config.learning.rerank_interval,
                enabled: true,
            },
        ));
        let reranker_token = reranker.shutdown_token();
        tasks.push(reranker.start());

        info!(particles = particles.len(), "Corpus runtime started");

        Ok(CorpusRuntime {
            config,
            bus,
            orchestrator,
            particles,
            learner,
            ranker,
            repository,
            shutdown,
            reranker_token,
            tasks,
        })
    }
}

pub struct CorpusRuntime {
    config: CorpusConfig,
    bus: MessageBus,
    orchestrator: Arc<Orchestrator>,
    particles: Vec<Arc<Particle>>,
    learner: Arc<PatternLearner>,
    ranker: Arc<MtfRanker>,
    repository: Arc<dyn ParticleStateRepository>,
    shutdown: CancellationToken,
    reranker_token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl CorpusRuntime {
    pub fn builder(config: CorpusConfig) -> RuntimeBuilder {
        RuntimeBuilder::new(config)
    }

    pub async fn start(config: CorpusConfig, registry: WorkerRegistry) -> anyhow::Result<Self> {
        RuntimeBuilder::new(config).registry(registry).start().await
    }

    pub fn config(&self) -> &CorpusConfig {
        &self.config
    }

    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    pub fn learner(&self) -> &Arc<PatternLearner> {
        &self.learner
    }

    pub fn ranker(&self) -> &Arc<MtfRanker> {
        &self.ranker
    }

    pub fn particle(&self, id: &ParticleId) -> Option<&Arc<Particle>> {
        self.particles.iter().find(|p| p.id() == id)
    }

    pub async fn submit(&self, request: Request) -> Result<SynthesisResult, PlanningError> {
        self.orchestrator.submit(request).await
    }

    pub async fn get_particle_stats(&self, particle_id: &ParticleId) -> Result<Option<ParticleState>, RepositoryError> {
        self.orchestrator.get_particle_stats(particle_id).await
    }

    pub async fn all_particle_stats(&self) -> Result<Vec<ParticleState>, RepositoryError> {
        self.repository.list_all().await
    }

    pub fn get_pattern_map_stats(&self) -> PatternMapStats {
        self.orchestrator.get_pattern_map_stats()
    }

    /// Stop background tasks and persist the pattern map. In-flight particle
    /// cycles already spawned are not awaited.
    pub async fn shutdown(self) -> anyhow::Result<()> {
        self.reranker_token.cancel();
        self.orchestrator.shutdown().await;
        self.shutdown.cancel();

        for task in self.tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Background task ended abnormally");
            }
        }

        if let Some(path) = self.config.persistence.patterns_file() {
            self.learner
                .save(&path)
                .await
                .with_context(|| format!("Failed to save pattern map to {}", path.display()))?;
        }

        info!("Corpus runtime stopped");
        Ok(())
    }
}
