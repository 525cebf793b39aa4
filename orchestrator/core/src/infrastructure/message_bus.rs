// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Message Bus Implementation - Partitioned Pub/Sub
//
// In-memory broadcast transport between the orchestrator and particles.
// Every subscriber owns a bounded FIFO queue; a publish fans the message out
// to every subscription on the destination partition. Target filtering is the
// subscriber's job, never the bus's.
//
// In-process only: messages are lost on restart.

use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::domain::config::BusConfig;
use crate::domain::message::{BackpressurePolicy, DeliveryReport, Message, Partition, SubscriberId};

/// Event bus errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BusError {
    #[error("Subscriber {0} is already subscribed")]
    AlreadySubscribed(SubscriberId),

    #[error("Subscriber {0} is not subscribed")]
    NotSubscribed(SubscriberId),

    #[error("Queue capacity must be greater than 0")]
    ZeroCapacity,

    #[error("Subscription closed")]
    Closed,

    #[error("No messages available")]
    Empty,
}

/// Per-subscription counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionStats {
    pub subscriber_id: SubscriberId,
    pub partition: Partition,
    pub capacity: usize,
    pub queued: usize,
    pub delivered_count: u64,
    pub dropped_count: u64,
    pub policy: BackpressurePolicy,
}

/// Partition traffic over the trailing balance window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BusBalance {
    pub internal: usize,
    pub external: usize,
    /// Share of windowed traffic that went to INTERNAL, in `[0, 1]`.
    pub ratio: f64,
}

enum Delivery {
    Delivered(SubscriberId),
    Rejected(SubscriberId),
    Closed,
}

struct SubscriptionEntry {
    subscriber_id: SubscriberId,
    partition: Partition,
    capacity: usize,
    policy: BackpressurePolicy,
    sender: mpsc::Sender<Arc<Message>>,
    receiver: tokio::sync::Mutex<mpsc::Receiver<Arc<Message>>>,
    delivered: AtomicU64,
    dropped: AtomicU64,
    closed: CancellationToken,
}

impl SubscriptionEntry {
    async fn deliver(&self, message: Arc<Message>) -> Delivery {
        if self.closed.is_cancelled() {
            return Delivery::Closed;
        }

        let sent = match self.policy {
            BackpressurePolicy::Block => {
                tokio::select! {
                    result = self.sender.send(message) => result.is_ok(),
                    _ = self.closed.cancelled() => false,
                }
            }
            BackpressurePolicy::Reject => match self.sender.try_send(message) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    metrics::counter!("corpus_bus_dropped_total", "partition" => self.partition.to_string())
                        .increment(1);
                    debug!(subscriber = %self.subscriber_id, "Queue full, message rejected");
                    return Delivery::Rejected(self.subscriber_id.clone());
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            },
        };

        if sent {
            self.delivered.fetch_add(1, Ordering::Relaxed);
            Delivery::Delivered(self.subscriber_id.clone())
        } else {
            Delivery::Closed
        }
    }

    async fn pull(&self) -> Result<Arc<Message>, BusError> {
        let mut receiver = self.receiver.lock().await;
        tokio::select! {
            biased;
            message = receiver.recv() => message.ok_or(BusError::Closed),
            _ = self.closed.cancelled() => Err(BusError::Closed),
        }
    }

    fn stats(&self) -> SubscriptionStats {
        SubscriptionStats {
            subscriber_id: self.subscriber_id.clone(),
            partition: self.partition,
            capacity: self.capacity,
            queued: self.capacity.saturating_sub(self.sender.capacity()),
            delivered_count: self.delivered.load(Ordering::Relaxed),
            dropped_count: self.dropped.load(Ordering::Relaxed),
            policy: self.policy,
        }
    }
}

/// Handle returned by [`MessageBus::subscribe`]. Dropping it closes the
/// subscription; the bus prunes it on the next publish.
pub struct Subscription {
    entry: Arc<SubscriptionEntry>,
}

impl Subscription {
    pub fn subscriber_id(&self) -> &SubscriberId {
        &self.entry.subscriber_id
    }

    pub fn partition(&self) -> Partition {
        self.entry.partition
    }

    /// Receive the next message (blocks until one is available or the
    /// subscription closes).
    pub async fn pull(&self) -> Result<Arc<Message>, BusError> {
        self.entry.pull().await
    }

    /// Try to receive a message without blocking
    pub fn try_pull(&self) -> Result<Arc<Message>, BusError> {
        let mut receiver = self.entry.receiver.try_lock().map_err(|_| BusError::Empty)?;
        receiver.try_recv().map_err(|e| match e {
            mpsc::error::TryRecvError::Empty => BusError::Empty,
            mpsc::error::TryRecvError::Disconnected => BusError::Closed,
        })
    }

    pub fn stats(&self) -> SubscriptionStats {
        self.entry.stats()
    }

    pub fn is_closed(&self) -> bool {
        self.entry.closed.is_cancelled()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.entry.closed.cancel();
    }
}

struct BusInner {
    config: BusConfig,
    subscriptions: RwLock<HashMap<SubscriberId, Arc<SubscriptionEntry>>>,
    history: Mutex<VecDeque<Arc<Message>>>,
    balance: Mutex<VecDeque<Partition>>,
}

/// Broadcast bus with bounded per-subscriber queues.
#[derive(Clone)]
pub struct MessageBus {
    inner: Arc<BusInner>,
}

impl MessageBus {
    pub fn new(config: BusConfig) -> Self {
        Self {
            inner: Arc::new(BusInner {
                config,
                subscriptions: RwLock::new(HashMap::new()),
                history: Mutex::new(VecDeque::new()),
                balance: Mutex::new(VecDeque::new()),
            }),
        }
    }

    pub fn with_default_config() -> Self {
        Self::new(BusConfig::default())
    }

    pub fn config(&self) -> &BusConfig {
        &self.inner.config
    }

    /// Subscribe with the bus-wide default backpressure policy.
    pub fn subscribe(
        &self,
        subscriber_id: SubscriberId,
        partition: Partition,
        queue_capacity: usize,
    ) -> Result<Subscription, BusError> {
        self.subscribe_with_policy(subscriber_id, partition, queue_capacity, self.inner.config.backpressure)
    }

    pub fn subscribe_with_policy(
        &self,
        subscriber_id: SubscriberId,
        partition: Partition,
        queue_capacity: usize,
        policy: BackpressurePolicy,
    ) -> Result<Subscription, BusError> {
        if queue_capacity == 0 {
            return Err(BusError::ZeroCapacity);
        }

        let mut subscriptions = self.inner.subscriptions.write();
        if let Some(existing) = subscriptions.get(&subscriber_id) {
            if !existing.closed.is_cancelled() {
                return Err(BusError::AlreadySubscribed(subscriber_id));
            }
        }

        let (sender, receiver) = mpsc::channel(queue_capacity);
        let entry = Arc::new(SubscriptionEntry {
            subscriber_id: subscriber_id.clone(),
            partition,
            capacity: queue_capacity,
            policy,
            sender,
            receiver: tokio::sync::Mutex::new(receiver),
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            closed: CancellationToken::new(),
        });
        subscriptions.insert(subscriber_id.clone(), entry.clone());

        debug!(subscriber = %subscriber_id, %partition, queue_capacity, ?policy, "Subscribed");
        Ok(Subscription { entry })
    }

    pub fn unsubscribe(&self, subscriber_id: &SubscriberId) -> Result<(), BusError> {
        let entry = self
            .inner
            .subscriptions
            .write()
            .remove(subscriber_id)
            .ok_or_else(|| BusError::NotSubscribed(subscriber_id.clone()))?;
        entry.closed.cancel();
        debug!(subscriber = %subscriber_id, "Unsubscribed");
        Ok(())
    }

    /// Broadcast to every subscription on `message.dest_partition`.
    ///
    /// With no matching subscription this is a logged no-op. Under the
    /// `Block` policy a full queue suspends this call until it drains.
    pub async fn publish(&self, message: Message) -> DeliveryReport {
        let partition = message.dest_partition;
        let message = Arc::new(message);

        let targets: Vec<Arc<SubscriptionEntry>> = self
            .inner
            .subscriptions
            .read()
            .values()
            .filter(|entry| entry.partition == partition)
            .cloned()
            .collect();

        let outcomes = join_all(targets.iter().map(|entry| entry.deliver(message.clone()))).await;

        let mut report = DeliveryReport {
            message_id: message.id.clone(),
            partition,
            delivered: Vec::new(),
            rejected: Vec::new(),
        };
        let mut saw_closed = false;
        for outcome in outcomes {
            match outcome {
                Delivery::Delivered(id) => report.delivered.push(id),
                Delivery::Rejected(id) => report.rejected.push(id),
                Delivery::Closed => saw_closed = true,
            }
        }
        report.delivered.sort();
        report.rejected.sort();

        if saw_closed {
            self.prune_closed();
        }

        self.record_balance(partition);

        if report.is_undeliverable() {
            metrics::counter!("corpus_bus_undeliverable_total", "partition" => partition.to_string()).increment(1);
            warn!(
                message_id = %message.id,
                %partition,
                target = %message.target_id,
                "Undeliverable message: no subscribers on partition"
            );
            return report;
        }

        if !report.delivered.is_empty() {
            metrics::counter!("corpus_bus_delivered_total", "partition" => partition.to_string())
                .increment(report.delivered.len() as u64);
            self.record_history(message.clone());
        }

        debug!(
            message_id = %message.id,
            %partition,
            target = %message.target_id,
            delivered = report.delivered.len(),
            rejected = report.rejected.len(),
            "Published message"
        );
        report
    }

    /// Pull the next message for a subscriber (blocks until available).
    pub async fn pull(&self, subscriber_id: &SubscriberId) -> Result<Arc<Message>, BusError> {
        let entry = self
            .inner
            .subscriptions
            .read()
            .get(subscriber_id)
            .cloned()
            .ok_or_else(|| BusError::NotSubscribed(subscriber_id.clone()))?;
        entry.pull().await
    }

    pub fn subscription_stats(&self, subscriber_id: &SubscriberId) -> Option<SubscriptionStats> {
        self.inner.subscriptions.read().get(subscriber_id).map(|entry| entry.stats())
    }

    pub fn subscriber_count(&self, partition: Partition) -> usize {
        self.inner
            .subscriptions
            .read()
            .values()
            .filter(|entry| entry.partition == partition && !entry.closed.is_cancelled())
            .count()
    }

    /// Most recent delivered messages, oldest first.
    pub fn history(&self) -> Vec<Arc<Message>> {
        self.inner.history.lock().iter().cloned().collect()
    }

    pub fn balance(&self) -> BusBalance {
        let window = self.inner.balance.lock();
        let internal = window.iter().filter(|p| **p == Partition::Internal).count();
        let external = window.len() - internal;
        let ratio = if window.is_empty() {
            0.0
        } else {
            internal as f64 / window.len() as f64
        };
        BusBalance {
            internal,
            external,
            ratio,
        }
    }

    fn record_history(&self, message: Arc<Message>) {
        let mut history = self.inner.history.lock();
        if history.len() >= self.inner.config.history_capacity {
            history.pop_front();
        }
        history.push_back(message);
    }

    fn record_balance(&self, partition: Partition) {
        let mut window = self.inner.balance.lock();
        if window.len() >= self.inner.config.balance_window {
            window.pop_front();
        }
        window.push_back(partition);
    }

    fn prune_closed(&self) {
        let mut subscriptions = self.inner.subscriptions.write();
        subscriptions.retain(|id, entry| {
            let keep = !entry.closed.is_cancelled();
            if !keep {
                debug!(subscriber = %id, "Pruned closed subscription");
            }
            keep
        });
    }
}
