// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Message Bus Abstraction - At-Least-Once Pub/Sub with Durable Groups
//
// The transport contract the worker and the settlement subscriber rely on:
// durable named consumer groups, manual acknowledgment, bounded in-flight
// deliveries, and redelivery on negative acknowledgment. The production
// implementation is NATS JetStream (infrastructure/nats.rs); this module
// carries the trait plus an in-process implementation with the same
// semantics for development and tests.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Bus connection failed: {0}")]
    Connect(String),

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Subscribe failed: {0}")]
    Subscribe(String),

    #[error("Acknowledgment failed: {0}")]
    Ack(String),
}

/// Flow-control knobs for one durable consumer.
#[derive(Debug, Clone)]
pub struct ConsumerOptions {
    /// Max outstanding unacknowledged deliveries.
    pub max_in_flight: usize,

    /// Heartbeat interval used to detect stalled consumers.
    pub idle_heartbeat: Duration,
}

impl Default for ConsumerOptions {
    fn default() -> Self {
        Self {
            max_in_flight: 10,
            idle_heartbeat: Duration::from_secs(5),
        }
    }
}

/// Durable publish/subscribe transport. Delivery is at-least-once; callers
/// needing exactly-once business effects layer idempotency guards on top.
#[async_trait]
pub trait MessageBus: Send + Sync {
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<(), BusError>;

    /// Subscribe a durable, named consumer group to a subject. The delivery
    /// position of the group survives resubscription.
    async fn subscribe(
        &self,
        subject: &str,
        group: &str,
        options: ConsumerOptions,
    ) -> Result<Box<dyn Subscription>, BusError>;
}

#[async_trait]
pub trait Subscription: Send {
    /// Next delivery for this consumer, waiting for both a message and a
    /// free in-flight slot.
    async fn next(&mut self) -> Result<Delivery, BusError>;
}

#[async_trait]
pub(crate) trait Acknowledger: Send {
    async fn ack(self: Box<Self>) -> Result<(), BusError>;

    async fn nack(self: Box<Self>) -> Result<(), BusError>;
}

/// One in-flight message. Must be explicitly `ack`ed or `nack`ed; a nack
/// requests redelivery per the bus retry policy.
pub struct Delivery {
    pub subject: String,
    pub payload: Bytes,
    /// 1-based delivery attempt, incremented on every redelivery.
    pub attempt: u32,
    acker: Box<dyn Acknowledger>,
}

impl Delivery {
    pub(crate) fn new(
        subject: String,
        payload: Bytes,
        attempt: u32,
        acker: Box<dyn Acknowledger>,
    ) -> Self {
        Self {
            subject,
            payload,
            attempt,
            acker,
        }
    }

    pub async fn ack(self) -> Result<(), BusError> {
        self.acker.ack().await
    }

    pub async fn nack(self) -> Result<(), BusError> {
        self.acker.nack().await
    }
}

// ---------------------------------------------------------------------------
// In-process implementation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct QueuedMessage {
    subject: String,
    payload: Bytes,
    attempt: u32,
}

struct GroupState {
    queue: Mutex<VecDeque<QueuedMessage>>,
    arrival: Notify,
    in_flight: Arc<Semaphore>,
}

impl GroupState {
    fn new(max_in_flight: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            arrival: Notify::new(),
            in_flight: Arc::new(Semaphore::new(max_in_flight)),
        }
    }

    fn push(&self, msg: QueuedMessage) {
        self.queue.lock().expect("bus queue poisoned").push_back(msg);
        self.arrival.notify_one();
    }
}

struct SubjectState {
    /// Retained log so a group subscribing after publication still sees
    /// earlier messages (deliver-all, like a stream-backed consumer).
    log: Vec<QueuedMessage>,
    groups: HashMap<String, Arc<GroupState>>,
}

/// In-process bus with the same consumer-group semantics as the JetStream
/// implementation: per-group queues, bounded in-flight window, redelivery
/// on nack. Events are lost on process exit; tests and development only.
#[derive(Clone, Default)]
pub struct InMemoryBus {
    subjects: Arc<Mutex<HashMap<String, SubjectState>>>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageBus for InMemoryBus {
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<(), BusError> {
        let msg = QueuedMessage {
            subject: subject.to_string(),
            payload,
            attempt: 1,
        };

        let mut subjects = self.subjects.lock().expect("bus state poisoned");
        let state = subjects.entry(subject.to_string()).or_insert_with(|| SubjectState {
            log: Vec::new(),
            groups: HashMap::new(),
        });
        state.log.push(msg.clone());
        for group in state.groups.values() {
            group.push(msg.clone());
        }
        debug!(subject, groups = state.groups.len(), "published message");
        Ok(())
    }

    async fn subscribe(
        &self,
        subject: &str,
        group: &str,
        options: ConsumerOptions,
    ) -> Result<Box<dyn Subscription>, BusError> {
        let group_state = {
            let mut subjects = self.subjects.lock().expect("bus state poisoned");
            let state = subjects.entry(subject.to_string()).or_insert_with(|| SubjectState {
                log: Vec::new(),
                groups: HashMap::new(),
            });

            match state.groups.get(group) {
                Some(existing) => existing.clone(),
                None => {
                    let fresh = Arc::new(GroupState::new(options.max_in_flight));
                    for msg in &state.log {
                        fresh.push(msg.clone());
                    }
                    state.groups.insert(group.to_string(), fresh.clone());
                    fresh
                }
            }
        };

        Ok(Box::new(InMemorySubscription { group: group_state }))
    }
}

struct InMemorySubscription {
    group: Arc<GroupState>,
}

#[async_trait]
impl Subscription for InMemorySubscription {
    async fn next(&mut self) -> Result<Delivery, BusError> {
        let permit = self
            .group
            .in_flight
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| BusError::Subscribe(e.to_string()))?;

        loop {
            let popped = self.group.queue.lock().expect("bus queue poisoned").pop_front();
            if let Some(msg) = popped {
                let acker = InMemoryAcknowledger {
                    group: self.group.clone(),
                    msg: msg.clone(),
                    _permit: permit,
                };
                return Ok(Delivery::new(msg.subject, msg.payload, msg.attempt, Box::new(acker)));
            }
            self.group.arrival.notified().await;
        }
    }
}

struct InMemoryAcknowledger {
    group: Arc<GroupState>,
    msg: QueuedMessage,
    _permit: OwnedSemaphorePermit,
}

#[async_trait]
impl Acknowledger for InMemoryAcknowledger {
    async fn ack(self: Box<Self>) -> Result<(), BusError> {
        Ok(())
    }

    async fn nack(self: Box<Self>) -> Result<(), BusError> {
        let mut redelivery = self.msg.clone();
        redelivery.attempt += 1;
        self.group.push(redelivery);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_then_subscribe_sees_retained_messages() {
        let bus = InMemoryBus::new();
        bus.publish("agent.tasks", Bytes::from_static(b"one")).await.unwrap();

        let mut sub = bus
            .subscribe("agent.tasks", "agent-worker", ConsumerOptions::default())
            .await
            .unwrap();

        let delivery = sub.next().await.unwrap();
        assert_eq!(delivery.payload.as_ref(), b"one");
        assert_eq!(delivery.attempt, 1);
        delivery.ack().await.unwrap();
    }

    #[tokio::test]
    async fn test_nack_redelivers_with_incremented_attempt() {
        let bus = InMemoryBus::new();
        let mut sub = bus
            .subscribe("agent.tasks", "agent-worker", ConsumerOptions::default())
            .await
            .unwrap();

        bus.publish("agent.tasks", Bytes::from_static(b"retry-me")).await.unwrap();

        let first = sub.next().await.unwrap();
        assert_eq!(first.attempt, 1);
        first.nack().await.unwrap();

        let second = sub.next().await.unwrap();
        assert_eq!(second.payload.as_ref(), b"retry-me");
        assert_eq!(second.attempt, 2);
        second.ack().await.unwrap();
    }

    #[tokio::test]
    async fn test_groups_each_receive_a_copy() {
        let bus = InMemoryBus::new();
        let mut workers = bus
            .subscribe("market.trade.escrowed", "agent-worker", ConsumerOptions::default())
            .await
            .unwrap();
        let mut settlement = bus
            .subscribe("market.trade.escrowed", "market-settlement", ConsumerOptions::default())
            .await
            .unwrap();

        bus.publish("market.trade.escrowed", Bytes::from_static(b"t1")).await.unwrap();

        let a = workers.next().await.unwrap();
        let b = settlement.next().await.unwrap();
        assert_eq!(a.payload, b.payload);
        a.ack().await.unwrap();
        b.ack().await.unwrap();
    }

    #[tokio::test]
    async fn test_in_flight_window_blocks_at_capacity() {
        let bus = InMemoryBus::new();
        let mut sub = bus
            .subscribe(
                "agent.tasks",
                "agent-worker",
                ConsumerOptions {
                    max_in_flight: 1,
                    ..ConsumerOptions::default()
                },
            )
            .await
            .unwrap();

        bus.publish("agent.tasks", Bytes::from_static(b"a")).await.unwrap();
        bus.publish("agent.tasks", Bytes::from_static(b"b")).await.unwrap();

        let first = sub.next().await.unwrap();

        // Window is full until the first delivery is acknowledged.
        let blocked =
            tokio::time::timeout(Duration::from_millis(50), sub.next()).await;
        assert!(blocked.is_err());

        first.ack().await.unwrap();
        let second = sub.next().await.unwrap();
        assert_eq!(second.payload.as_ref(), b"b");
        second.ack().await.unwrap();
    }
}
