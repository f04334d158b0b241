// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// NATS JetStream Message Bus
//
// Production transport behind the `MessageBus` trait: one stream over the
// runtime's subject namespace, durable pull consumers per group with
// explicit acks, `max_ack_pending` as the in-flight window, and NAK-driven
// redelivery.

use async_nats::jetstream::{self, consumer};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use tracing::info;

use crate::domain::events::subjects;
use crate::infrastructure::bus::{
    Acknowledger, BusError, ConsumerOptions, Delivery, MessageBus, Subscription,
};

pub struct JetStreamBus {
    context: jetstream::Context,
    stream_name: String,
}

impl JetStreamBus {
    /// Connect to NATS and bind the runtime stream, creating it when it
    /// does not exist yet so deployment order (worker vs. producer first)
    /// does not matter.
    pub async fn connect(url: &str, stream_name: &str) -> Result<Self, BusError> {
        let client = async_nats::connect(url)
            .await
            .map_err(|e| BusError::Connect(e.to_string()))?;
        info!(url, stream = stream_name, "nats connected");

        let bus = Self {
            context: jetstream::new(client),
            stream_name: stream_name.to_string(),
        };
        bus.ensure_stream().await?;
        Ok(bus)
    }

    async fn ensure_stream(&self) -> Result<jetstream::stream::Stream, BusError> {
        self.context
            .get_or_create_stream(jetstream::stream::Config {
                name: self.stream_name.clone(),
                subjects: subjects::ALL.iter().map(|s| (*s).into()).collect(),
                ..Default::default()
            })
            .await
            .map_err(|e| BusError::Connect(e.to_string()))
    }
}

#[async_trait]
impl MessageBus for JetStreamBus {
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<(), BusError> {
        let ack = self
            .context
            .publish(subject.to_string(), payload)
            .await
            .map_err(|e| BusError::Publish(e.to_string()))?;
        // Wait for the stream-level ack so the message is durable before we
        // report success to the caller.
        ack.await.map_err(|e| BusError::Publish(e.to_string()))?;
        Ok(())
    }

    async fn subscribe(
        &self,
        subject: &str,
        group: &str,
        options: ConsumerOptions,
    ) -> Result<Box<dyn Subscription>, BusError> {
        let stream = self.ensure_stream().await?;

        let consumer: consumer::PullConsumer = stream
            .get_or_create_consumer(
                group,
                consumer::pull::Config {
                    durable_name: Some(group.to_string()),
                    filter_subject: subject.to_string(),
                    ack_policy: consumer::AckPolicy::Explicit,
                    max_ack_pending: options.max_in_flight as i64,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| BusError::Subscribe(e.to_string()))?;

        let messages = consumer
            .stream()
            .heartbeat(options.idle_heartbeat)
            .messages()
            .await
            .map_err(|e| BusError::Subscribe(e.to_string()))?;

        info!(subject, group, "durable consumer subscribed");
        Ok(Box::new(JetStreamSubscription { messages }))
    }
}

struct JetStreamSubscription {
    messages: consumer::pull::Stream,
}

#[async_trait]
impl Subscription for JetStreamSubscription {
    async fn next(&mut self) -> Result<Delivery, BusError> {
        match self.messages.next().await {
            Some(Ok(message)) => {
                let attempt = message
                    .info()
                    .map(|info| info.delivered as u32)
                    .unwrap_or(1);
                let subject = message.subject.to_string();
                let payload = message.payload.clone();
                Ok(Delivery::new(
                    subject,
                    payload,
                    attempt,
                    Box::new(JetStreamAcknowledger { message }),
                ))
            }
            Some(Err(e)) => Err(BusError::Subscribe(e.to_string())),
            // The pull stream ended (server restart); the consumer is
            // durable, so surface it and let the caller resubscribe.
            None => Err(BusError::Subscribe("message stream closed".to_string())),
        }
    }
}

struct JetStreamAcknowledger {
    message: jetstream::Message,
}

#[async_trait]
impl Acknowledger for JetStreamAcknowledger {
    async fn ack(self: Box<Self>) -> Result<(), BusError> {
        self.message
            .ack()
            .await
            .map_err(|e| BusError::Ack(e.to_string()))
    }

    async fn nack(self: Box<Self>) -> Result<(), BusError> {
        self.message
            .ack_with(jetstream::AckKind::Nak(None))
            .await
            .map_err(|e| BusError::Ack(e.to_string()))
    }
}
