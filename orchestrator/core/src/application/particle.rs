// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Particle Runner
//!
//! Drives one [`DomainWorker`] through the execution cycle:
//!
//! 1. **Observe**: ignore anything not addressed to this particle
//! 2. **Circuit check**: an open breaker fails the action without running it
//! 3. **Act**: run the worker
//! 4. **Evaluate**: score the outcome
//! 5. **Memorize**: persist [`ParticleState`], feed the breaker, publish the
//!    result to the message's `reply_to`
//!
//! Particles never retry. Every addressed message pulled off the queue runs
//! in its own task; state updates serialize through the state lock.

use corpus_cortex::IdGenerator;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::domain::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitPermit};
use crate::domain::message::{Message, MessagePayload, SubscriberId};
use crate::domain::particle::{
    ActionError, ActionErrorKind, ActionResult, DomainWorker, MetricDeclaration, ParticleId, ParticleState,
    WorkerOutcome,
};
use crate::domain::repository::{ParticleStateRepository, RepositoryError};
use crate::infrastructure::message_bus::{BusError, MessageBus, Subscription};

pub struct Particle {
    id: ParticleId,
    subscriber_id: SubscriberId,
    worker: Arc<dyn DomainWorker>,
    breaker: CircuitBreaker,
    declared: Vec<MetricDeclaration>,
    /// `None` until the first execution unless restored from the repository.
    state: Mutex<Option<ParticleState>>,
    repository: Arc<dyn ParticleStateRepository>,
    bus: MessageBus,
    ids: IdGenerator,
}

impl Particle {
    /// Build a particle, restoring its persisted state if there is one.
    pub async fn load(
        worker: Arc<dyn DomainWorker>,
        bus: MessageBus,
        repository: Arc<dyn ParticleStateRepository>,
        breaker_config: CircuitBreakerConfig,
    ) -> Result<Self, RepositoryError> {
        let id = ParticleId::new(worker.kind());
        let declared = worker.declared_metrics();

        let state = repository.find_by_id(&id).await?.map(|mut state| {
            state.declare_metrics(&declared);
            state
        });
        if let Some(state) = &state {
            info!(particle = %id, cycle_count = state.cycle_count, "Restored particle state");
        }

        Ok(Self {
            subscriber_id: id.subscriber_id(),
            breaker: CircuitBreaker::new(id.as_str(), breaker_config),
            ids: IdGenerator::new(format!("res-{}", id)),
            id,
            worker,
            declared,
            state: Mutex::new(state),
            repository,
            bus,
        })
    }

    pub fn id(&self) -> &ParticleId {
        &self.id
    }

    pub fn subscriber_id(&self) -> &SubscriberId {
        &self.subscriber_id
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub async fn state(&self) -> Option<ParticleState> {
        self.state.lock().await.clone()
    }

    /// Run one cycle for `message`. Returns `None` when the message is not
    /// addressed to this particle or is not an action.
    pub async fn handle(&self, message: &Message) -> Option<ActionResult> {
        if !message.is_addressed_to(&self.subscriber_id) {
            return None;
        }
        let parameters = match &message.payload {
            MessagePayload::Action { parameters } => parameters,
            MessagePayload::Result(_) => {
                debug!(particle = %self.id, message_id = %message.id, "Ignoring result payload");
                return None;
            }
        };

        let result = match self.breaker.try_acquire() {
            Err(open) => ActionResult::failure(
                message.correlation_id.clone(),
                self.id.clone(),
                ActionError::new(ActionErrorKind::CircuitOpen, open.to_string()),
                Duration::ZERO,
            ),
            Ok(permit) => {
                let started = Instant::now();
                let outcome = match AssertUnwindSafe(self.worker.execute(parameters)).catch_unwind().await {
                    Ok(outcome) => outcome,
                    Err(panic) => {
                        let reason = panic_message(panic.as_ref());
                        error!(particle = %self.id, correlation_id = %message.correlation_id, %reason, "Worker panicked");
                        WorkerOutcome::failed(format!("worker panicked: {}", reason))
                    }
                };
                let duration = started.elapsed();

                let score = self.worker.evaluate(&outcome).clamp(0.0, 1.0);
                let updates = self.worker.metric_updates(&outcome);
                let result = ActionResult::from_outcome(
                    message.correlation_id.clone(),
                    self.id.clone(),
                    outcome,
                    score,
                    duration,
                );

                self.memorize(&result, &updates, permit).await;
                result
            }
        };

        self.reply(message, result.clone()).await;
        Some(result)
    }

    async fn memorize(&self, result: &ActionResult, updates: &[(String, f64)], permit: CircuitPermit<'_>) {
        {
            let mut guard = self.state.lock().await;
            let state = guard.get_or_insert_with(|| ParticleState::new(self.id.clone(), &self.declared));
            state.record_cycle(result.success, result.score, updates);

            // saved under the lock so the repository never sees an older cycle last
            if let Err(e) = self.repository.save(state).await {
                error!(particle = %self.id, error = %e, "Failed to persist particle state");
            }
        }

        if result.success {
            permit.success();
        } else {
            permit.failure();
        }
        metrics::counter!("corpus_particle_cycles_total", "particle" => self.id.to_string()).increment(1);
        debug!(
            particle = %self.id,
            correlation_id = %result.correlation_id,
            success = result.success,
            score = result.score,
            "Cycle complete"
        );
    }

    async fn reply(&self, message: &Message, result: ActionResult) {
        let Some(reply_to) = message.reply_to.clone() else {
            debug!(particle = %self.id, correlation_id = %result.correlation_id, "No reply_to, result not published");
            return;
        };
        let reply = Message::result(&self.ids, reply_to, message.priority, result);
        self.bus.publish(reply).await;
    }

    /// Pull from `subscription` until it closes or `shutdown` fires. In-flight
    /// cycles are left to finish.
    pub fn spawn(self: Arc<Self>, subscription: Subscription, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(particle = %self.id, partition = %subscription.partition(), "Particle started");
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    pulled = subscription.pull() => match pulled {
                        Ok(message) => {
                            if !message.is_addressed_to(&self.subscriber_id) {
                                continue;
                            }
                            let particle = self.clone();
                            tokio::spawn(async move {
                                particle.handle(&message).await;
                            });
                        }
                        Err(BusError::Closed) => break,
                        Err(e) => {
                            warn!(particle = %self.id, error = %e, "Pull failed");
                            break;
                        }
                    }
                }
            }
            info!(particle = %self.id, "Particle stopped");
        })
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
