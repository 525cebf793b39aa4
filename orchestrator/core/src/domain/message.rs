// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use corpus_cortex::IdGenerator;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::domain::particle::ActionResult;

/// Coarse routing group. The bus routes by partition only; filtering by
/// target happens in the subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Partition {
    Internal,
    External,
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Partition::Internal => f.write_str("INTERNAL"),
            Partition::External => f.write_str("EXTERNAL"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriberId(pub String);

impl SubscriberId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ties an Action to the ActionResult it produces.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CorrelationId(pub String);

impl CorrelationId {
    pub fn generate(ids: &IdGenerator) -> Self {
        Self(ids.next_id(b"correlation"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessagePayload {
    Action { parameters: serde_json::Value },
    Result(ActionResult),
}

/// Unit of transport on the bus. Published messages are shared as
/// `Arc<Message>` and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub source_partition: Partition,
    pub dest_partition: Partition,
    pub priority: u8,
    pub target_id: SubscriberId,
    pub correlation_id: CorrelationId,
    /// Subscriber expecting the reply, if any.
    pub reply_to: Option<SubscriberId>,
    pub payload: MessagePayload,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Action addressed to a particle on the EXTERNAL partition.
    pub fn action(
        ids: &IdGenerator,
        target_id: SubscriberId,
        correlation_id: CorrelationId,
        parameters: serde_json::Value,
        priority: u8,
        reply_to: SubscriberId,
    ) -> Self {
        Self {
            id: MessageId(ids.next_id(correlation_id.as_str().as_bytes())),
            source_partition: Partition::Internal,
            dest_partition: Partition::External,
            priority,
            target_id,
            correlation_id,
            reply_to: Some(reply_to),
            payload: MessagePayload::Action { parameters },
            created_at: Utc::now(),
        }
    }

    /// Result published back onto the INTERNAL partition.
    pub fn result(ids: &IdGenerator, target_id: SubscriberId, priority: u8, result: ActionResult) -> Self {
        Self {
            id: MessageId(ids.next_id(result.correlation_id.as_str().as_bytes())),
            source_partition: Partition::External,
            dest_partition: Partition::Internal,
            priority,
            target_id,
            correlation_id: result.correlation_id.clone(),
            reply_to: None,
            payload: MessagePayload::Result(result),
            created_at: Utc::now(),
        }
    }

    pub fn is_addressed_to(&self, subscriber: &SubscriberId) -> bool {
        &self.target_id == subscriber
    }
}

/// What a full subscriber queue does to a publisher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackpressurePolicy {
    /// Suspend the publisher until the queue has room.
    #[default]
    Block,
    /// Refuse the message for this subscriber and count it as dropped.
    Reject,
}

/// Outcome of one `publish` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryReport {
    pub message_id: MessageId,
    pub partition: Partition,
    pub delivered: Vec<SubscriberId>,
    /// Subscribers whose queue was full under the `Reject` policy.
    pub rejected: Vec<SubscriberId>,
}

impl DeliveryReport {
    /// No subscription matched the destination partition.
    pub fn is_undeliverable(&self) -> bool {
        self.delivered.is_empty() && self.rejected.is_empty()
    }

    pub fn delivered_to(&self, subscriber: &SubscriberId) -> bool {
        self.delivered.contains(subscriber)
    }

    pub fn rejected_by(&self, subscriber: &SubscriberId) -> bool {
        self.rejected.contains(subscriber)
    }

    /// Classify the report from the point of view of one intended target.
    pub fn check_target(&self, target: &SubscriberId) -> Result<(), DispatchError> {
        if self.is_undeliverable() {
            return Err(DispatchError::NoSubscribers(self.partition));
        }
        if self.rejected_by(target) {
            return Err(DispatchError::Backpressure(target.clone()));
        }
        if !self.delivered_to(target) {
            return Err(DispatchError::TargetNotSubscribed(target.clone()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error("No subscriber on partition {0}")]
    NoSubscribers(Partition),

    #[error("Queue of {0} is full")]
    Backpressure(SubscriberId),

    #[error("Target {0} is not subscribed to the destination partition")]
    TargetNotSubscribed(SubscriberId),
}
