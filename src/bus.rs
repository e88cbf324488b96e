//! The bus contract — `init / publish / subscribe` — and handler types.
//!
//! There are exactly two realizations of [`EventBus`], selected by
//! configuration:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                 EventBus (per service)                  │
//! │  init(publishes, service_name) / publish / subscribe    │
//! └─────────────────────────────────────────────────────────┘
//!            │                              │
//!            ▼                              ▼
//! ┌─────────────────────┐       ┌──────────────────────────┐
//! │   RabbitEventBus    │       │      MemoryEventBus      │
//! │ (broker, "amqp")    │       │  (local, always built)   │
//! └─────────────────────┘       └──────────────────────────┘
//! ```
//!
//! Both encode the same envelope wire format, so business logic
//! validated against the in-memory bus runs unchanged against the
//! broker.

use std::error::Error;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::BusError;
use crate::event::{Event, EventCategory};

/// Explicit outcome of an event handler.
///
/// Replaces truthy/falsy coercion: a delivery gets exactly one of these,
/// and the consumer turns it into exactly one acknowledgment decision.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandlerOutcome {
    /// Processing succeeded; the delivery is permanently removed.
    Acknowledge,
    /// Processing did not complete; the delivery is returned to the
    /// queue for redelivery.
    RequeueAndRetry,
}

/// Error a handler may fail with. Treated exactly like
/// [`HandlerOutcome::RequeueAndRetry`] by consumers.
pub type HandlerError = Box<dyn Error + Send + Sync>;

/// Boxed future returned by event handlers.
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<HandlerOutcome, HandlerError>> + Send>>;

/// A shared, callable handler for events carrying payloads of type `T`.
///
/// Registered once per consumer at setup time and invoked once per
/// delivered event.
pub type EventHandler<T> = Arc<dyn Fn(Event<T>) -> HandlerFuture + Send + Sync>;

/// Adapt an async closure into an [`EventHandler`].
///
/// ## Example
///
/// ```ignore
/// let on_login = handler(|event: Event<UserLoggedIn>| async move {
///     record_login(&event.payload).await?;
///     Ok(HandlerOutcome::Acknowledge)
/// });
/// bus.subscribe(user_logged_in(), on_login).await?;
/// ```
pub fn handler<T, F, Fut>(f: F) -> EventHandler<T>
where
    F: Fn(Event<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<HandlerOutcome, HandlerError>> + Send + 'static,
{
    Arc::new(move |event| Box::pin(f(event)))
}

/// The publish/subscribe contract shared by both bus realizations.
///
/// `init` consumes the freshly constructed bus and returns it ready for
/// use: connected (where applicable), with the exchanges this process
/// publishes to asserted, and carrying the consuming service's name for
/// queue derivation.
#[async_trait]
pub trait EventBus: Send + Sync + Sized {
    /// Establish the bus for a service.
    ///
    /// `publishes` drives exchange assertion; `service_name` is used in
    /// queue naming so that instances of one service compete on a shared
    /// queue while distinct services each receive every event.
    ///
    /// Broker unreachability is not an error here — it is announced on
    /// the state-notification channel.
    async fn init(
        self,
        publishes: &[EventCategory],
        service_name: &str,
    ) -> Result<Self, BusError>;

    /// Publish one event to its category's destination.
    ///
    /// Suspends until the underlying transport is ready; never drops the
    /// event.
    async fn publish<T>(&self, event: Event<T>) -> Result<(), BusError>
    where
        T: Serialize + Send;

    /// Register a handler for a category and start consuming.
    async fn subscribe<T>(
        &self,
        category: EventCategory,
        handler: EventHandler<T>,
    ) -> Result<(), BusError>
    where
        T: DeserializeOwned + Send + 'static;
}
