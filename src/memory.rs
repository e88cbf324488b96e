//! In-memory event bus for broker-free testing and single-process use.
//!
//! Satisfies the identical contract as the broker-backed bus: `publish`
//! encodes the same envelope wire format and delivers it to every
//! locally registered subscription with a matching category on the next
//! scheduling tick. No persistence, no cross-process visibility, no
//! acknowledgment semantics — delivery is assumed instantaneous and
//! always successful.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{info, warn};

use crate::bus::{EventBus, EventHandler};
use crate::envelope::Envelope;
use crate::error::BusError;
use crate::event::{Event, EventCategory};

/// A locally registered subscription: the category it matches and a
/// type-erased dispatcher that decodes the envelope and runs the handler.
struct MemorySubscription {
    category: EventCategory,
    dispatch: Arc<dyn Fn(Vec<u8>) + Send + Sync>,
}

/// In-memory realization of [`EventBus`].
///
/// Requires a Tokio runtime: deliveries are spawned as tasks so that
/// `publish` returns without waiting on handlers.
///
/// ## Example
///
/// ```ignore
/// let bus = MemoryEventBus::new()
///     .init(&[test_category()], "message-bus-test")
///     .await?;
///
/// bus.subscribe(test_category(), handler(|event: Event<TestPayload>| async move {
///     Ok(HandlerOutcome::Acknowledge)
/// }))
/// .await?;
///
/// bus.publish(Event::new(test_category(), TestPayload { x: 10, y: 20 })).await?;
/// ```
#[derive(Clone)]
pub struct MemoryEventBus {
    service_name: String,
    subscriptions: Arc<Mutex<Vec<MemorySubscription>>>,
    published: Arc<Mutex<Vec<(EventCategory, Vec<u8>)>>>,
}

impl Default for MemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryEventBus {
    /// Create a new, empty in-memory bus.
    pub fn new() -> Self {
        Self {
            service_name: String::new(),
            subscriptions: Arc::new(Mutex::new(Vec::new())),
            published: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// The consuming service's name, as given to `init`.
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Encoded envelopes published so far, with their categories.
    pub fn published(&self) -> Vec<(EventCategory, Vec<u8>)> {
        self.published.lock().unwrap().clone()
    }

    /// Number of envelopes published so far.
    pub fn published_len(&self) -> usize {
        self.published.lock().unwrap().len()
    }

    /// Number of registered subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.lock().unwrap().len()
    }

    /// Clear the published-envelope log (useful for test cleanup).
    pub fn clear(&self) {
        self.published.lock().unwrap().clear();
    }
}

#[async_trait]
impl EventBus for MemoryEventBus {
    async fn init(
        mut self,
        _publishes: &[EventCategory],
        service_name: &str,
    ) -> Result<Self, BusError> {
        self.service_name = service_name.to_string();
        info!(service = service_name, "message queue started");
        Ok(self)
    }

    async fn publish<T>(&self, event: Event<T>) -> Result<(), BusError>
    where
        T: Serialize + Send,
    {
        let envelope = Envelope::wrap(event);
        let body = envelope.to_bytes()?;
        let category = envelope.event.category.clone();

        self.published
            .lock()
            .unwrap()
            .push((category.clone(), body.clone()));

        let subscriptions = self.subscriptions.lock().unwrap();
        for subscription in subscriptions.iter().filter(|s| s.category == category) {
            (subscription.dispatch)(body.clone());
        }
        Ok(())
    }

    async fn subscribe<T>(
        &self,
        category: EventCategory,
        handler: EventHandler<T>,
    ) -> Result<(), BusError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let dispatch = Arc::new(move |body: Vec<u8>| {
            let handler = handler.clone();
            tokio::spawn(async move {
                match Envelope::<T>::from_bytes(&body) {
                    // Outcomes carry no acknowledgment semantics here.
                    Ok(envelope) => {
                        let _ = handler(envelope.event).await;
                    }
                    Err(e) => warn!(error = %e, "can't parse envelope"),
                }
            });
        });

        self.subscriptions
            .lock()
            .unwrap()
            .push(MemorySubscription { category, dispatch });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{handler, HandlerOutcome};
    use serde::Deserialize;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    struct TestPayload {
        x: i32,
        y: i32,
    }

    fn test_category() -> EventCategory {
        EventCategory::new("something_else", "service_01")
    }

    fn capturing_handler(
        tx: mpsc::Sender<Event<TestPayload>>,
    ) -> EventHandler<TestPayload> {
        handler(move |event: Event<TestPayload>| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(event).await;
                Ok(HandlerOutcome::Acknowledge)
            }
        })
    }

    #[tokio::test]
    async fn delivers_payload_to_matching_subscription() {
        let bus = MemoryEventBus::new()
            .init(&[test_category()], "message-bus-test")
            .await
            .unwrap();

        let (tx, mut rx) = mpsc::channel(4);
        bus.subscribe(test_category(), capturing_handler(tx))
            .await
            .unwrap();

        let payload = TestPayload { x: 10, y: 20 };
        bus.publish(Event::new(test_category(), payload.clone()))
            .await
            .unwrap();

        let received = timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received.payload, payload);
        assert_eq!(received.category, test_category());
    }

    #[tokio::test]
    async fn ignores_subscriptions_for_other_categories() {
        let bus = MemoryEventBus::new()
            .init(&[], "message-bus-test")
            .await
            .unwrap();

        let (tx, mut rx) = mpsc::channel(4);
        bus.subscribe(EventCategory::new("other", "ns"), capturing_handler(tx))
            .await
            .unwrap();

        bus.publish(Event::new(test_category(), TestPayload { x: 1, y: 2 }))
            .await
            .unwrap();

        assert!(timeout(Duration::from_millis(50), rx.recv()).await.is_err());
    }

    #[tokio::test]
    async fn fans_out_to_every_matching_subscription() {
        let bus = MemoryEventBus::new()
            .init(&[], "message-bus-test")
            .await
            .unwrap();

        let (tx1, mut rx1) = mpsc::channel(4);
        let (tx2, mut rx2) = mpsc::channel(4);
        bus.subscribe(test_category(), capturing_handler(tx1))
            .await
            .unwrap();
        bus.subscribe(test_category(), capturing_handler(tx2))
            .await
            .unwrap();

        bus.publish(Event::new(test_category(), TestPayload { x: 3, y: 4 }))
            .await
            .unwrap();

        let a = timeout(Duration::from_secs(1), rx1.recv()).await.unwrap();
        let b = timeout(Duration::from_secs(1), rx2.recv()).await.unwrap();
        assert_eq!(a.unwrap().payload, TestPayload { x: 3, y: 4 });
        assert_eq!(b.unwrap().payload, TestPayload { x: 3, y: 4 });
    }

    #[tokio::test]
    async fn init_records_the_service_name() {
        let bus = MemoryEventBus::new()
            .init(&[test_category()], "message-bus-test")
            .await
            .unwrap();
        assert_eq!(bus.service_name(), "message-bus-test");
    }

    #[tokio::test]
    async fn records_published_envelopes() {
        let bus = MemoryEventBus::new()
            .init(&[], "message-bus-test")
            .await
            .unwrap();

        bus.publish(Event::new(test_category(), TestPayload { x: 1, y: 1 }))
            .await
            .unwrap();
        bus.publish(Event::new(test_category(), TestPayload { x: 2, y: 2 }))
            .await
            .unwrap();

        assert_eq!(bus.published_len(), 2);
        assert_eq!(bus.published()[0].0, test_category());

        bus.clear();
        assert_eq!(bus.published_len(), 0);
    }
}
