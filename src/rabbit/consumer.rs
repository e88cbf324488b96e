//! Consume path — topology establishment and the acknowledgment protocol.
//!
//! Every delivered message gets exactly one acknowledgment decision:
//! ack, nack-with-requeue, or quarantine. Never both, never neither —
//! anything else starves the broker's delivery accounting and either
//! grows in-flight work without bound or wedges the consumer.

use std::sync::Arc;

use futures::StreamExt;
use lapin::message::Delivery;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions,
    QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel};
use serde::de::DeserializeOwned;
use tracing::{info, warn};

use super::connection::ConnectionManager;
use crate::bus::{EventHandler, HandlerOutcome};
use crate::envelope::Envelope;
use crate::error::BusError;
use crate::event::EventCategory;
use crate::topology;

/// The single acknowledgment decision for one delivery.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum AckDecision {
    /// Remove the message permanently.
    Ack,
    /// Return the message to the queue for redelivery.
    Requeue,
    /// Move the message to the quarantine queue, then remove it.
    Quarantine,
}

/// Establishes per-subscription topology and runs delivery loops.
pub(crate) struct Consumer {
    connection: Arc<ConnectionManager>,
    service_name: String,
}

impl Consumer {
    pub fn new(connection: Arc<ConnectionManager>, service_name: impl Into<String>) -> Self {
        Self {
            connection,
            service_name: service_name.into(),
        }
    }

    /// Set up one subscription and start its delivery loop.
    ///
    /// Declares the service's queue, binds it to the category's fanout
    /// exchange with an empty routing key, declares the quarantine
    /// queue, and spawns a task that consumes deliveries sequentially —
    /// per-queue order is the broker's delivery order.
    pub async fn subscribe<T>(
        &self,
        category: EventCategory,
        handler: EventHandler<T>,
    ) -> Result<(), BusError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let queue = topology::queue_name(&category, &self.service_name);
        let exchange = topology::exchange_name(&category);
        let quarantine = topology::quarantine_name(&category, &self.service_name);

        let channel = self.connection.channel().await?;
        channel
            .queue_declare(
                &queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        channel
            .queue_bind(
                &queue,
                &exchange,
                topology::ROUTING_KEY,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;
        channel
            .queue_declare(
                &quarantine,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;

        let mut deliveries = channel
            .basic_consume(
                &queue,
                "",
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        info!(queue = %queue, exchange = %exchange, "consuming");

        tokio::spawn(async move {
            while let Some(next) = deliveries.next().await {
                match next {
                    Ok(delivery) => {
                        let decision = decide(&delivery.data, &handler).await;
                        apply(decision, delivery, &channel, &quarantine).await;
                    }
                    Err(e) => warn!(error = %e, "delivery stream failure"),
                }
            }
        });

        Ok(())
    }
}

/// Decide the acknowledgment for one raw delivery body.
///
/// Broker-independent so the protocol can be exercised without a live
/// broker:
///
/// - unparseable body → requeue, handler never invoked
/// - retry budget exhausted → quarantine, handler never invoked
/// - handler acknowledges → ack
/// - handler requeues or fails → requeue
pub(crate) async fn decide<T>(body: &[u8], handler: &EventHandler<T>) -> AckDecision
where
    T: DeserializeOwned,
{
    let envelope = match Envelope::<T>::from_bytes(body) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(error = %e, "can't parse envelope");
            return AckDecision::Requeue;
        }
    };

    if envelope.meta.exhausted() {
        warn!(
            event_id = %envelope.event.id,
            attempts = envelope.meta.attempts,
            "delivery retries exhausted"
        );
        return AckDecision::Quarantine;
    }

    match handler(envelope.event).await {
        Ok(HandlerOutcome::Acknowledge) => AckDecision::Ack,
        Ok(HandlerOutcome::RequeueAndRetry) => {
            warn!("event handler failure");
            AckDecision::Requeue
        }
        Err(e) => {
            warn!(error = %e, "event handler failure");
            AckDecision::Requeue
        }
    }
}

/// Carry out a decision against the broker.
///
/// A quarantined body is republished verbatim to the quarantine queue
/// through the default exchange before the original delivery is acked;
/// if that publish fails the delivery is requeued instead, so the
/// message is never lost.
async fn apply(decision: AckDecision, delivery: Delivery, channel: &Channel, quarantine: &str) {
    let requeue = BasicNackOptions {
        multiple: false,
        requeue: true,
    };

    let result = match decision {
        AckDecision::Ack => delivery.acker.ack(BasicAckOptions::default()).await,
        AckDecision::Requeue => delivery.acker.nack(requeue).await,
        AckDecision::Quarantine => {
            let published = channel
                .basic_publish(
                    "",
                    quarantine,
                    BasicPublishOptions::default(),
                    &delivery.data,
                    BasicProperties::default(),
                )
                .await;
            match published {
                Ok(_) => delivery.acker.ack(BasicAckOptions::default()).await,
                Err(e) => {
                    warn!(error = %e, "quarantine publish failure");
                    delivery.acker.nack(requeue).await
                }
            }
        }
    };

    if let Err(e) = result {
        warn!(error = %e, "acknowledgment failure");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::handler;
    use crate::envelope::DeliveryMeta;
    use crate::event::Event;
    use serde::{Deserialize, Serialize};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    struct TestPayload {
        data: String,
    }

    fn test_event() -> Event<TestPayload> {
        Event::with_id(
            "some-event-id",
            EventCategory::new("foo", "bar"),
            TestPayload {
                data: "payload".to_string(),
            },
        )
    }

    fn counting_handler(
        calls: Arc<AtomicUsize>,
        outcome: HandlerOutcome,
    ) -> EventHandler<TestPayload> {
        handler(move |_event: Event<TestPayload>| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Ok(outcome) }
        })
    }

    #[tokio::test]
    async fn acknowledges_when_handler_accepts() {
        let calls = Arc::new(AtomicUsize::new(0));
        let h = counting_handler(calls.clone(), HandlerOutcome::Acknowledge);

        let body = Envelope::wrap(test_event()).to_bytes().unwrap();
        let decision = decide(&body, &h).await;

        assert_eq!(decision, AckDecision::Ack);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn requeues_when_handler_declines() {
        let calls = Arc::new(AtomicUsize::new(0));
        let h = counting_handler(calls.clone(), HandlerOutcome::RequeueAndRetry);

        let body = Envelope::wrap(test_event()).to_bytes().unwrap();
        let decision = decide(&body, &h).await;

        assert_eq!(decision, AckDecision::Requeue);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn requeues_when_handler_fails() {
        let calls = Arc::new(AtomicUsize::new(0));
        let h: EventHandler<TestPayload> = {
            let calls = calls.clone();
            handler(move |_event: Event<TestPayload>| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { Err("database unavailable".into()) }
            })
        };

        let body = Envelope::wrap(test_event()).to_bytes().unwrap();
        let decision = decide(&body, &h).await;

        assert_eq!(decision, AckDecision::Requeue);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn requeues_malformed_body_without_invoking_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let h = counting_handler(calls.clone(), HandlerOutcome::Acknowledge);

        let decision = decide(b"not json", &h).await;

        assert_eq!(decision, AckDecision::Requeue);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn quarantines_exhausted_delivery_without_invoking_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let h = counting_handler(calls.clone(), HandlerOutcome::Acknowledge);

        let mut envelope = Envelope::wrap(test_event());
        envelope.meta = DeliveryMeta {
            attempts: 10,
            retries: 10,
            failures: 10,
        };
        let body = envelope.to_bytes().unwrap();
        let decision = decide(&body, &h).await;

        assert_eq!(decision, AckDecision::Quarantine);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn fresh_envelopes_never_quarantine() {
        let calls = Arc::new(AtomicUsize::new(0));
        let h = counting_handler(calls.clone(), HandlerOutcome::RequeueAndRetry);

        let body = Envelope::wrap(test_event()).to_bytes().unwrap();
        let decision = decide(&body, &h).await;

        // attempts=0 < retries=10: the quarantine path is not taken.
        assert_eq!(decision, AckDecision::Requeue);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
