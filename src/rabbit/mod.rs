//! Broker-backed event bus over AMQP.
//!
//! One connector owns one connection and one channel, shared between its
//! publisher and consumer roles. Topology (exchange assertion, queue
//! assertion, binding, consumption start) is established at `init` /
//! `subscribe` and never re-negotiated; teardown happens by closing the
//! connector, at which point unacknowledged deliveries return to the
//! broker.

mod connection;
mod consumer;
mod publisher;

pub use connection::{ConnectionManager, ConnectionState, ReconnectPolicy, StateChange};

use std::sync::Arc;

use async_trait::async_trait;
use lapin::options::ExchangeDeclareOptions;
use lapin::types::FieldTable;
use lapin::ExchangeKind;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::info;

use crate::bus::{EventBus, EventHandler};
use crate::error::BusError;
use crate::event::{Event, EventCategory};
use crate::topology;
use consumer::Consumer;
use publisher::Publisher;

/// Construction parameters for the broker-backed bus.
#[derive(Clone, Debug)]
pub struct RabbitOptions {
    /// Broker connection URL, e.g. `amqp://rabbitmq:5672`.
    pub url: String,
    /// Connection attempt policy. Defaults to a single attempt.
    pub reconnect: ReconnectPolicy,
}

impl RabbitOptions {
    /// Options for the given broker URL with the default policy.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect: ReconnectPolicy::default(),
        }
    }

    /// Replace the connection attempt policy.
    pub fn with_reconnect(mut self, reconnect: ReconnectPolicy) -> Self {
        self.reconnect = reconnect;
        self
    }
}

/// Broker-backed realization of [`EventBus`].
///
/// ## Example
///
/// ```ignore
/// let bus = RabbitEventBus::new(RabbitOptions::new("amqp://rabbitmq"))
///     .init(&[user_logged_in()], "audit")
///     .await?;
///
/// bus.subscribe(user_logged_in(), on_user_logged_in).await?;
/// bus.publish(Event::new(user_logged_in(), payload)).await?;
/// ```
pub struct RabbitEventBus {
    options: RabbitOptions,
    connection: Arc<ConnectionManager>,
    publisher: Publisher,
    consumer: Option<Consumer>,
}

impl RabbitEventBus {
    /// Construct an unconnected bus. Call [`EventBus::init`] to connect.
    pub fn new(options: RabbitOptions) -> Self {
        let connection = Arc::new(ConnectionManager::new());
        let publisher = Publisher::new(connection.clone());
        Self {
            options,
            connection,
            publisher,
            consumer: None,
        }
    }

    /// Observe connection-state transitions, for health and readiness
    /// reporting. Subscribe before `init` to see the initial transition.
    pub fn observe(&self) -> broadcast::Receiver<StateChange> {
        self.connection.observe()
    }

    /// Current connectivity state.
    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Tear the connector down, closing channel and connection.
    pub async fn close(&self) {
        self.connection.close().await;
    }
}

#[async_trait]
impl EventBus for RabbitEventBus {
    async fn init(
        mut self,
        publishes: &[EventCategory],
        service_name: &str,
    ) -> Result<Self, BusError> {
        self.connection
            .connect(&self.options.url, &self.options.reconnect)
            .await;

        // Connection failure is announced on the state channel, not
        // returned — the caller decides whether it is fatal. Topology
        // assertion only makes sense once a channel exists.
        if self.connection.state() == ConnectionState::Connected {
            let channel = self.connection.channel().await?;
            for category in publishes {
                let options = ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                };
                channel
                    .exchange_declare(
                        &topology::exchange_name(category),
                        ExchangeKind::Fanout,
                        options,
                        FieldTable::default(),
                    )
                    .await?;
            }
        }

        self.consumer = Some(Consumer::new(self.connection.clone(), service_name));
        info!(service = service_name, "message queue started");
        Ok(self)
    }

    async fn publish<T>(&self, event: Event<T>) -> Result<(), BusError>
    where
        T: Serialize + Send,
    {
        self.publisher.publish(event).await
    }

    async fn subscribe<T>(
        &self,
        category: EventCategory,
        handler: EventHandler<T>,
    ) -> Result<(), BusError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        match &self.consumer {
            Some(consumer) => consumer.subscribe(category, handler).await,
            None => Err(BusError::NotInitialized),
        }
    }
}
