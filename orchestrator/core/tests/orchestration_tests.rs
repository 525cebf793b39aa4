// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! End-to-end tests for the orchestration loop.
//!
//! Each test starts a full runtime (bus, particles, orchestrator, reranker)
//! with purpose-built workers and drives it through `submit`.

use async_trait::async_trait;
use corpus_core::application::{Planner, WorkerRegistry};
use corpus_core::infrastructure::workers::{builtin_workers, Workspace};
use corpus_core::{
    ActionErrorKind, ActionSpec, BackpressurePolicy, CircuitState, CorpusConfig, CorpusRuntime, CorrelationId,
    DomainWorker, Message, MessagePayload, ParticleId, Partition, PlanningError, Request, SubscriberId, WorkerOutcome,
};
use corpus_cortex::{IdGenerator, PatternKind};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Sleeps for `delay_ms`, then fails when `fail` is set.
struct SleepWorker {
    calls: AtomicUsize,
}

impl SleepWorker {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl DomainWorker for SleepWorker {
    fn kind(&self) -> &str {
        "sleeper"
    }

    async fn execute(&self, parameters: &Value) -> WorkerOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = parameters.get("delay_ms").and_then(Value::as_u64).unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(delay)).await;
        if parameters.get("fail").and_then(Value::as_bool).unwrap_or(false) {
            WorkerOutcome::failed("asked to fail")
        } else {
            WorkerOutcome::ok(json!({ "slept_ms": delay }))
        }
    }
}

/// Fails until `healthy` is flipped; panics while `panicking` is set.
struct FlakyWorker {
    calls: AtomicUsize,
    healthy: AtomicBool,
    panicking: AtomicBool,
}

impl FlakyWorker {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            healthy: AtomicBool::new(false),
            panicking: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl DomainWorker for FlakyWorker {
    fn kind(&self) -> &str {
        "flaky"
    }

    async fn execute(&self, _parameters: &Value) -> WorkerOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.panicking.load(Ordering::SeqCst) {
            panic!("worker bug");
        }
        if self.healthy.load(Ordering::SeqCst) {
            WorkerOutcome::ok(Value::Null)
        } else {
            WorkerOutcome::failed("service unavailable")
        }
    }
}

/// `fan_out {count, delay_ms, fail: [indices]}` → `count` sleeper actions.
fn planner() -> Planner {
    let mut planner = Planner::new();
    planner.register("fan_out", |request: &Request| {
        let count = request.parameters.get("count").and_then(Value::as_u64).unwrap_or(1);
        let delay = request.parameters.get("delay_ms").and_then(Value::as_u64).unwrap_or(0);
        let failing: Vec<u64> = request
            .parameters
            .get("fail")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(Value::as_u64).collect())
            .unwrap_or_default();
        Ok((0..count)
            .map(|i| ActionSpec::new("sleeper", json!({ "delay_ms": delay, "fail": failing.contains(&i) })))
            .collect())
    });
    planner.register("ping", |_request: &Request| Ok(vec![ActionSpec::new("flaky", json!({}))]));
    planner.register("pair", |_request: &Request| {
        Ok(vec![
            ActionSpec::new("echo", json!({"message": "left"})),
            ActionSpec::new("file_reader", json!({"path": "missing.txt"})),
        ])
    });
    planner.register("prioritized", |_request: &Request| {
        Ok(vec![
            ActionSpec::new("echo", json!({"message": "low"})).with_priority(1),
            ActionSpec::new("echo", json!({"message": "high"})).with_priority(9),
        ])
    });
    planner
}

async fn runtime_with(config: CorpusConfig, workers: Vec<Arc<dyn DomainWorker>>) -> CorpusRuntime {
    let registry: WorkerRegistry = workers.into_iter().collect();
    CorpusRuntime::builder(config)
        .registry(registry)
        .planner(planner())
        .start()
        .await
        .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_broadcast_reaches_all_but_only_target_acts() {
    let workspace = tempfile::tempdir().unwrap();
    let runtime = runtime_with(CorpusConfig::default(), builtin_workers(Workspace::new(workspace.path()))).await;
    let observer = runtime
        .bus()
        .subscribe(SubscriberId::new("observer"), Partition::External, 16)
        .unwrap();

    let result = runtime
        .submit(Request::new("echo", json!({"message": "hello"})))
        .await
        .unwrap();

    assert!(result.overall_success);
    assert_eq!(result.results[0].output, json!({"message": "hello"}));

    let seen = observer.pull().await.unwrap();
    assert_eq!(seen.target_id, SubscriberId::new("echo"));
    assert!(matches!(seen.payload, MessagePayload::Action { .. }));

    let echo = runtime.get_particle_stats(&ParticleId::new("echo")).await.unwrap().unwrap();
    assert_eq!(echo.cycle_count, 1);
    assert!(runtime
        .get_particle_stats(&ParticleId::new("file_writer"))
        .await
        .unwrap()
        .is_none());
    assert!(runtime
        .get_particle_stats(&ParticleId::new("file_reader"))
        .await
        .unwrap()
        .is_none());

    runtime.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_dispatch_latency_tracks_slowest_action() {
    let runtime = runtime_with(CorpusConfig::default(), vec![SleepWorker::new() as Arc<dyn DomainWorker>]).await;

    let started = Instant::now();
    let result = runtime
        .submit(Request::new("fan_out", json!({"count": 5, "delay_ms": 100})))
        .await
        .unwrap();
    let elapsed = started.elapsed();

    assert!(result.overall_success);
    assert_eq!(result.total, 5);
    assert!(elapsed >= Duration::from_millis(100));
    assert!(elapsed < Duration::from_millis(350), "took {:?}", elapsed);

    runtime.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_partial_failure_synthesis() {
    let runtime = runtime_with(CorpusConfig::default(), vec![SleepWorker::new() as Arc<dyn DomainWorker>]).await;

    let result = runtime
        .submit(Request::new("fan_out", json!({"count": 5, "fail": [1, 3]})))
        .await
        .unwrap();

    assert!(!result.overall_success);
    assert!((result.success_rate - 0.6).abs() < 1e-9);
    assert_eq!(result.succeeded.len(), 3);
    for i in [0, 2, 4] {
        let id = &result.results[i].correlation_id;
        assert!(result.succeeded.contains(id));
        assert!(result.result_for(id).unwrap().success);
    }
    for i in [1, 3] {
        let id = &result.results[i].correlation_id;
        assert_eq!(result.result_for(id).unwrap().error_kind(), Some(ActionErrorKind::Execution));
    }

    assert!(result.patterns.iter().any(|p| p.kind == PatternKind::Error));
    assert!(runtime.get_pattern_map_stats().size >= 1);

    runtime.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_timeout_does_not_cancel_particle() {
    let mut config = CorpusConfig::default();
    config.orchestrator.action_deadline = Duration::from_millis(50);
    let worker = SleepWorker::new();
    let runtime = runtime_with(config, vec![worker.clone() as Arc<dyn DomainWorker>]).await;

    let result = runtime
        .submit(Request::new("fan_out", json!({"count": 1, "delay_ms": 200})))
        .await
        .unwrap();

    assert!(!result.overall_success);
    assert_eq!(result.results[0].error_kind(), Some(ActionErrorKind::Timeout));
    assert_eq!(runtime.orchestrator().pending_count(), 0);

    // the particle finishes and memorizes; the late result is discarded
    tokio::time::sleep(Duration::from_millis(400)).await;
    let state = runtime
        .get_particle_stats(&ParticleId::new("sleeper"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(state.cycle_count, 1);
    assert_eq!(state.successes, 1);
    assert_eq!(worker.calls.load(Ordering::SeqCst), 1);
    assert_eq!(runtime.ranker().usage("sleeper").unwrap().invocation_count, 1);

    runtime.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_circuit_breaker_isolates_failing_particle() {
    let mut config = CorpusConfig::default();
    config.breaker.recovery_timeout = Duration::from_millis(100);
    let worker = FlakyWorker::new();
    let runtime = runtime_with(config, vec![worker.clone() as Arc<dyn DomainWorker>]).await;
    let flaky = ParticleId::new("flaky");

    for _ in 0..5 {
        let result = runtime.submit(Request::new("ping", json!({}))).await.unwrap();
        assert_eq!(result.results[0].error_kind(), Some(ActionErrorKind::Execution));
    }
    assert_eq!(runtime.particle(&flaky).unwrap().breaker().state(), CircuitState::Open);

    let result = runtime.submit(Request::new("ping", json!({}))).await.unwrap();
    assert_eq!(result.results[0].error_kind(), Some(ActionErrorKind::CircuitOpen));
    assert_eq!(worker.calls.load(Ordering::SeqCst), 5);

    tokio::time::sleep(Duration::from_millis(150)).await;
    worker.healthy.store(true, Ordering::SeqCst);

    for _ in 0..3 {
        let result = runtime.submit(Request::new("ping", json!({}))).await.unwrap();
        assert!(result.overall_success);
    }

    let breaker = runtime.particle(&flaky).unwrap().breaker().snapshot();
    assert_eq!(breaker.state, CircuitState::Closed);
    assert_eq!(breaker.consecutive_failures, 0);
    assert_eq!(worker.calls.load(Ordering::SeqCst), 8);

    runtime.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_planning_failure_dispatches_nothing() {
    let workspace = tempfile::tempdir().unwrap();
    let runtime = runtime_with(CorpusConfig::default(), builtin_workers(Workspace::new(workspace.path()))).await;

    let err = runtime
        .submit(Request::new("teleport", json!({})))
        .await
        .unwrap_err();
    assert_eq!(err, PlanningError::UnknownKind("teleport".into()));

    let err = runtime
        .submit(Request::new("write_file", json!({"path": "a.txt"})))
        .await
        .unwrap_err();
    assert!(matches!(err, PlanningError::MissingParameter { .. }));

    // fan_out targets "sleeper", which is not registered here
    let err = runtime
        .submit(Request::new("fan_out", json!({"count": 2})))
        .await
        .unwrap_err();
    assert!(matches!(err, PlanningError::UnknownParticle { .. }));

    assert!(runtime.bus().history().is_empty());
    assert!(runtime.all_particle_stats().await.unwrap().is_empty());

    runtime.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_batch_write_learns_optimization_and_ranks_usage() {
    let workspace = tempfile::tempdir().unwrap();
    let runtime = runtime_with(CorpusConfig::default(), builtin_workers(Workspace::new(workspace.path()))).await;

    let files: Vec<_> = (0..3)
        .map(|i| json!({"path": format!("out/{}.txt", i), "content": "x"}))
        .collect();
    let result = runtime
        .submit(Request::new("batch_write", json!({ "files": files })))
        .await
        .unwrap();

    assert!(result.overall_success);
    assert!(workspace.path().join("out/2.txt").exists());
    let optimization = result
        .patterns
        .iter()
        .find(|p| p.kind == PatternKind::Optimization)
        .unwrap();
    assert_eq!(optimization.signature, "file_writer x3");

    runtime
        .submit(Request::new("echo", json!({"message": "hi"})))
        .await
        .unwrap();

    let table = runtime.ranker().rerank();
    assert_eq!(table.rank_of("file_writer"), Some(1));
    assert_eq!(table.rank_of("echo"), Some(2));

    let writer = runtime
        .get_particle_stats(&ParticleId::new("file_writer"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(writer.custom_metrics.get("bytes_written"), Some(&3.0));

    runtime.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_panicking_trials_reopen_circuit_and_recover() {
    let mut config = CorpusConfig::default();
    config.breaker.failure_threshold = 1;
    config.breaker.recovery_timeout = Duration::from_millis(50);
    let worker = FlakyWorker::new();
    let runtime = runtime_with(config, vec![worker.clone() as Arc<dyn DomainWorker>]).await;
    let flaky = ParticleId::new("flaky");

    let result = runtime.submit(Request::new("ping", json!({}))).await.unwrap();
    assert_eq!(result.results[0].error_kind(), Some(ActionErrorKind::Execution));
    assert_eq!(runtime.particle(&flaky).unwrap().breaker().state(), CircuitState::Open);

    tokio::time::sleep(Duration::from_millis(80)).await;
    worker.panicking.store(true, Ordering::SeqCst);

    // the half-open trial panics: reported as an execution failure, circuit reopens
    let result = runtime.submit(Request::new("ping", json!({}))).await.unwrap();
    let error = result.results[0].error.clone().unwrap();
    assert_eq!(error.kind, ActionErrorKind::Execution);
    assert!(error.message.contains("worker bug"), "{}", error.message);
    assert_eq!(runtime.particle(&flaky).unwrap().breaker().state(), CircuitState::Open);

    worker.panicking.store(false, Ordering::SeqCst);
    worker.healthy.store(true, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(80)).await;

    for _ in 0..3 {
        let result = runtime.submit(Request::new("ping", json!({}))).await.unwrap();
        assert!(result.overall_success);
    }
    assert_eq!(runtime.particle(&flaky).unwrap().breaker().state(), CircuitState::Closed);

    let state = runtime.get_particle_stats(&flaky).await.unwrap().unwrap();
    assert_eq!(state.failures, 2);
    assert_eq!(state.successes, 3);

    runtime.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stalled_subscriber_does_not_hang_submit() {
    let workspace = tempfile::tempdir().unwrap();
    let mut config = CorpusConfig::default();
    config.orchestrator.action_deadline = Duration::from_millis(200);
    let runtime = runtime_with(config, builtin_workers(Workspace::new(workspace.path()))).await;

    // never pulled; its queue fills after two actions
    let _observer = runtime
        .bus()
        .subscribe(SubscriberId::new("observer"), Partition::External, 2)
        .unwrap();

    let mut results = Vec::new();
    for _ in 0..4 {
        let started = Instant::now();
        let result = tokio::time::timeout(
            Duration::from_secs(2),
            runtime.submit(Request::new("echo", json!({"message": "hi"}))),
        )
        .await
        .expect("submit stalled on a full subscriber queue")
        .unwrap();
        assert!(started.elapsed() < Duration::from_secs(1), "took {:?}", started.elapsed());
        results.push(result);
    }

    assert!(results[0].overall_success);
    assert!(results[1].overall_success);
    for result in &results[2..] {
        assert_eq!(result.total, 1);
        assert_eq!(result.results[0].error_kind(), Some(ActionErrorKind::Timeout));
    }
    assert_eq!(runtime.orchestrator().pending_count(), 0);

    runtime.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_rejected_target_fails_without_waiting_for_deadline() {
    let workspace = tempfile::tempdir().unwrap();
    let mut config = CorpusConfig::default();
    config.bus.backpressure = BackpressurePolicy::Reject;
    config.orchestrator.action_deadline = Duration::from_secs(3);
    let runtime = runtime_with(config, builtin_workers(Workspace::new(workspace.path()))).await;
    let echo = SubscriberId::new("echo");

    // swap the echo particle's queue for a full one that nobody drains
    runtime.bus().unsubscribe(&echo).unwrap();
    let _stalled = runtime
        .bus()
        .subscribe_with_policy(echo.clone(), Partition::External, 1, BackpressurePolicy::Reject)
        .unwrap();
    let ids = IdGenerator::new("filler");
    runtime
        .bus()
        .publish(Message::action(
            &ids,
            echo.clone(),
            CorrelationId::generate(&ids),
            json!({}),
            5,
            SubscriberId::new("nobody"),
        ))
        .await;

    let started = Instant::now();
    let result = runtime
        .submit(Request::new("echo", json!({"message": "hi"})))
        .await
        .unwrap();

    assert!(started.elapsed() < Duration::from_secs(1), "took {:?}", started.elapsed());
    assert!(!result.overall_success);
    assert_eq!(result.results[0].error_kind(), Some(ActionErrorKind::Dispatch));
    assert_eq!(runtime.bus().subscription_stats(&echo).unwrap().dropped_count, 1);
    assert_eq!(runtime.orchestrator().pending_count(), 0);

    runtime.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_unsubscribed_target_fails_while_siblings_succeed() {
    let workspace = tempfile::tempdir().unwrap();
    let runtime = runtime_with(CorpusConfig::default(), builtin_workers(Workspace::new(workspace.path()))).await;
    runtime.bus().unsubscribe(&SubscriberId::new("file_reader")).unwrap();

    let result = runtime.submit(Request::new("pair", json!({}))).await.unwrap();

    assert_eq!(result.total, 2);
    assert!(!result.overall_success);
    assert!(result.results[0].success);
    assert_eq!(result.results[0].output, json!({"message": "left"}));
    let error = result.results[1].error.clone().unwrap();
    assert_eq!(error.kind, ActionErrorKind::Dispatch);
    assert!(error.message.contains("file_reader"), "{}", error.message);

    runtime.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_higher_priority_actions_publish_first() {
    let workspace = tempfile::tempdir().unwrap();
    let runtime = runtime_with(CorpusConfig::default(), builtin_workers(Workspace::new(workspace.path()))).await;

    let result = runtime.submit(Request::new("prioritized", json!({}))).await.unwrap();
    assert!(result.overall_success);

    let published: Vec<_> = runtime
        .bus()
        .history()
        .into_iter()
        .filter(|m| m.dest_partition == Partition::External)
        .collect();
    assert_eq!(published.len(), 2);
    assert_eq!(published[0].priority, 9);
    assert!(matches!(
        &published[0].payload,
        MessagePayload::Action { parameters } if parameters["message"] == "high"
    ));
    assert_eq!(published[1].priority, 1);

    runtime.shutdown().await.unwrap();
}
