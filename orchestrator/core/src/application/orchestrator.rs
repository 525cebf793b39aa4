// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Orchestrator
//!
//! Plan → Dispatch → Collect → Synthesize.
//!
//! - **Plan**: the [`Planner`] expands the request; failures surface as
//!   [`PlanningError`] and nothing is dispatched.
//! - **Dispatch**: every action gets a pending waiter first, then all actions
//!   are published concurrently in (priority desc, rank asc, plan index) order.
//! - **Collect**: each waiter races the action deadline, which also bounds
//!   the publish of that action. A timeout fails the action but never
//!   cancels the particle; results arriving afterwards are discarded by the
//!   collector.
//! - **Synthesize**: aggregate, detect shapes, feed the [`PatternLearner`].
//!
//! The collector task owns the INTERNAL subscription. It completes pending
//! waiters and reports every observed invocation to the [`MtfRanker`].

use corpus_cortex::{IdGenerator, MtfRanker, PatternLearner, PatternMapStats, RankTable};
use dashmap::DashMap;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::planner::Planner;
use crate::application::registry::WorkerRegistry;
use crate::domain::config::OrchestratorConfig;
use crate::domain::message::{CorrelationId, Message, MessagePayload, Partition, SubscriberId};
use crate::domain::particle::{ActionError, ActionErrorKind, ActionResult, ParticleId, ParticleState};
use crate::domain::plan::{Action, Plan, PlanningError, Request};
use crate::domain::repository::{ParticleStateRepository, RepositoryError};
use crate::domain::synthesis::SynthesisResult;
use crate::infrastructure::message_bus::{BusError, MessageBus, Subscription};

type PendingMap = DashMap<CorrelationId, oneshot::Sender<ActionResult>>;

/// Collaborators the orchestrator is wired with.
pub struct OrchestratorDeps {
    pub bus: MessageBus,
    pub planner: Planner,
    pub registry: WorkerRegistry,
    pub learner: Arc<PatternLearner>,
    pub ranker: Arc<MtfRanker>,
    pub repository: Arc<dyn ParticleStateRepository>,
}

pub struct Orchestrator {
    subscriber_id: SubscriberId,
    action_deadline: Duration,
    batchable: Vec<String>,
    bus: MessageBus,
    planner: Planner,
    registry: WorkerRegistry,
    learner: Arc<PatternLearner>,
    ranker: Arc<MtfRanker>,
    repository: Arc<dyn ParticleStateRepository>,
    pending: Arc<PendingMap>,
    ids: IdGenerator,
    shutdown: CancellationToken,
    collector: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl Orchestrator {
    /// Subscribe on INTERNAL and start the result collector.
    pub fn start(
        deps: OrchestratorDeps,
        config: &OrchestratorConfig,
        batchable: Vec<String>,
        queue_capacity: usize,
        shutdown: CancellationToken,
    ) -> Result<Arc<Self>, BusError> {
        let subscriber_id = SubscriberId::new(config.subscriber_id.clone());
        let subscription = deps
            .bus
            .subscribe(subscriber_id.clone(), Partition::Internal, queue_capacity)?;

        let orchestrator = Arc::new(Self {
            subscriber_id,
            action_deadline: config.action_deadline,
            batchable,
            bus: deps.bus,
            planner: deps.planner,
            registry: deps.registry,
            learner: deps.learner,
            ranker: deps.ranker,
            repository: deps.repository,
            pending: Arc::new(DashMap::new()),
            ids: IdGenerator::new("act"),
            shutdown,
            collector: parking_lot::Mutex::new(None),
        });

        let handle = spawn_collector(
            orchestrator.subscriber_id.clone(),
            subscription,
            orchestrator.pending.clone(),
            orchestrator.ranker.clone(),
            orchestrator.shutdown.clone(),
        );
        *orchestrator.collector.lock() = Some(handle);

        info!(subscriber = %orchestrator.subscriber_id, "Orchestrator started");
        Ok(orchestrator)
    }

    pub fn subscriber_id(&self) -> &SubscriberId {
        &self.subscriber_id
    }

    pub fn learner(&self) -> &Arc<PatternLearner> {
        &self.learner
    }

    pub fn ranker(&self) -> &Arc<MtfRanker> {
        &self.ranker
    }

    pub fn registry(&self) -> &WorkerRegistry {
        &self.registry
    }

    /// Number of actions still waiting for a result.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn plan(&self, request: &Request) -> Result<Plan, PlanningError> {
        self.planner.plan(request, &self.registry)
    }

    /// Run a request end to end. Only planning failures are errors; every
    /// other failure is reported per action inside the result.
    pub async fn submit(&self, request: Request) -> Result<SynthesisResult, PlanningError> {
        let plan = match self.plan(&request) {
            Ok(plan) => plan,
            Err(e) => {
                warn!(kind = %request.kind, error = %e, "Planning failed");
                return Err(e);
            }
        };
        metrics::counter!("corpus_orchestrator_submissions_total").increment(1);
        info!(kind = %plan.request_kind, actions = plan.len(), "Submitting plan");

        let started = Instant::now();
        let results = self.dispatch_and_collect(&plan).await;
        let synthesis = SynthesisResult::synthesize(&plan.request_kind, results, &self.batchable, started.elapsed());

        self.learner.learn(&synthesis.patterns).await;

        info!(
            kind = %synthesis.request_kind,
            overall_success = synthesis.overall_success,
            success_rate = synthesis.success_rate,
            elapsed_ms = synthesis.elapsed.as_millis() as u64,
            "Plan synthesized"
        );
        Ok(synthesis)
    }

    async fn dispatch_and_collect(&self, plan: &Plan) -> Vec<ActionResult> {
        // waiters exist before anything is published so no result can race ahead
        let mut receivers: Vec<Option<oneshot::Receiver<ActionResult>>> = plan
            .actions
            .iter()
            .map(|action| {
                let (tx, rx) = oneshot::channel();
                self.pending.insert(action.correlation_id.clone(), tx);
                Some(rx)
            })
            .collect();

        let mut results: Vec<Option<ActionResult>> = vec![None; plan.len()];
        let order = dispatch_order(&plan.actions, &self.ranker.ranks());
        // one deadline per action, shared by its publish and its collection
        let deadline = Instant::now() + self.action_deadline;

        let reports = join_all(order.iter().map(|&i| {
            let action = &plan.actions[i];
            let message = Message::action(
                &self.ids,
                action.target_particle.subscriber_id(),
                action.correlation_id.clone(),
                action.parameters.clone(),
                action.priority,
                self.subscriber_id.clone(),
            );
            async move { (i, tokio::time::timeout_at(deadline, self.bus.publish(message)).await) }
        }))
        .await;

        for (i, report) in reports {
            let action = &plan.actions[i];
            let error = match report {
                Ok(report) => match report.check_target(&action.target_particle.subscriber_id()) {
                    Ok(()) => continue,
                    Err(e) => ActionError::new(ActionErrorKind::Dispatch, e.to_string()),
                },
                Err(_) => {
                    metrics::counter!("corpus_orchestrator_timeouts_total").increment(1);
                    ActionError::new(
                        ActionErrorKind::Timeout,
                        format!("publish did not complete within {:?}", self.action_deadline),
                    )
                }
            };
            warn!(
                correlation_id = %action.correlation_id,
                particle = %action.target_particle,
                error = %error.message,
                "Dispatch failed"
            );
            self.pending.remove(&action.correlation_id);
            receivers[i] = None;
            results[i] = Some(ActionResult::failure(
                action.correlation_id.clone(),
                action.target_particle.clone(),
                error,
                Duration::ZERO,
            ));
        }

        let collected = join_all(
            receivers
                .into_iter()
                .enumerate()
                .filter_map(|(i, rx)| rx.map(|rx| (i, rx)))
                .map(|(i, rx)| async move { (i, self.await_result(&plan.actions[i], rx, deadline).await) }),
        )
        .await;

        for (i, result) in collected {
            results[i] = Some(result);
        }

        results
            .into_iter()
            .zip(&plan.actions)
            .map(|(result, action)| {
                result.unwrap_or_else(|| {
                    ActionResult::failure(
                        action.correlation_id.clone(),
                        action.target_particle.clone(),
                        ActionError::new(ActionErrorKind::Dispatch, "action was never collected"),
                        Duration::ZERO,
                    )
                })
            })
            .collect()
    }

    async fn await_result(
        &self,
        action: &Action,
        mut rx: oneshot::Receiver<ActionResult>,
        deadline: Instant,
    ) -> ActionResult {
        match tokio::time::timeout_at(deadline, &mut rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => ActionResult::failure(
                action.correlation_id.clone(),
                action.target_particle.clone(),
                ActionError::new(ActionErrorKind::Dispatch, "result channel closed"),
                Duration::ZERO,
            ),
            Err(_) => {
                self.pending.remove(&action.correlation_id);
                // the collector may have completed the waiter between the deadline and the removal
                if let Ok(result) = rx.try_recv() {
                    return result;
                }
                metrics::counter!("corpus_orchestrator_timeouts_total").increment(1);
                warn!(
                    correlation_id = %action.correlation_id,
                    particle = %action.target_particle,
                    deadline_ms = self.action_deadline.as_millis() as u64,
                    "Action timed out"
                );
                ActionResult::failure(
                    action.correlation_id.clone(),
                    action.target_particle.clone(),
                    ActionError::new(
                        ActionErrorKind::Timeout,
                        format!("no result within {:?}", self.action_deadline),
                    ),
                    self.action_deadline,
                )
            }
        }
    }

    pub async fn get_particle_stats(&self, particle_id: &ParticleId) -> Result<Option<ParticleState>, RepositoryError> {
        self.repository.find_by_id(particle_id).await
    }

    pub fn get_pattern_map_stats(&self) -> PatternMapStats {
        self.learner.stats()
    }

    /// Stop the collector. Pending waiters resolve as dispatch failures.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let handle = self.collector.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Collector task ended abnormally");
            }
        }
        self.pending.clear();
    }
}

/// Indices of `actions` in publish order: priority desc, rank asc (unranked
/// last), plan index asc.
pub fn dispatch_order(actions: &[Action], ranks: &RankTable) -> Vec<usize> {
    let mut order: Vec<usize> = (0..actions.len()).collect();
    order.sort_by_key(|&i| {
        let action = &actions[i];
        (
            std::cmp::Reverse(action.priority),
            ranks.rank_of(action.target_particle.as_str()).unwrap_or(u32::MAX),
            i,
        )
    });
    order
}

fn spawn_collector(
    subscriber_id: SubscriberId,
    subscription: Subscription,
    pending: Arc<PendingMap>,
    ranker: Arc<MtfRanker>,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                pulled = subscription.pull() => {
                    let message = match pulled {
                        Ok(message) => message,
                        Err(e) => {
                            debug!(error = %e, "Collector subscription ended");
                            break;
                        }
                    };
                    if !message.is_addressed_to(&subscriber_id) {
                        continue;
                    }
                    let MessagePayload::Result(result) = &message.payload else {
                        continue;
                    };

                    ranker.record_invocation(result.particle_id.as_str(), result.duration, result.success);

                    match pending.remove(&result.correlation_id) {
                        Some((_, waiter)) => {
                            if waiter.send(result.clone()).is_err() {
                                debug!(correlation_id = %result.correlation_id, "Waiter dropped before delivery");
                            }
                        }
                        None => warn!(
                            correlation_id = %result.correlation_id,
                            particle = %result.particle_id,
                            "Discarding late result"
                        ),
                    }
                }
            }
        }
        debug!("Collector stopped");
    })
}
