//! Publish path — envelope construction and the single broker publish.

use std::sync::Arc;

use lapin::options::BasicPublishOptions;
use lapin::BasicProperties;
use serde::Serialize;
use tracing::debug;

use super::connection::ConnectionManager;
use crate::envelope::Envelope;
use crate::error::BusError;
use crate::event::Event;
use crate::topology;

/// Publishes envelopes to the exchange derived from each event's
/// category.
pub(crate) struct Publisher {
    connection: Arc<ConnectionManager>,
}

impl Publisher {
    pub fn new(connection: Arc<ConnectionManager>) -> Self {
        Self { connection }
    }

    /// Wrap the event in a fresh envelope and publish it.
    ///
    /// Suspends until a channel exists; performs exactly one broker
    /// publish per invocation, with an empty routing key (the exchange
    /// is fanout — every bound queue receives the message). Delivery
    /// confidence beyond acceptance by the channel is the broker's
    /// responsibility.
    pub async fn publish<T>(&self, event: Event<T>) -> Result<(), BusError>
    where
        T: Serialize + Send,
    {
        let envelope = Envelope::wrap(event);
        let body = envelope.to_bytes()?;
        let exchange = topology::exchange_name(&envelope.event.category);

        let channel = self.connection.channel().await?;
        let _confirm = channel
            .basic_publish(
                &exchange,
                topology::ROUTING_KEY,
                BasicPublishOptions::default(),
                &body,
                BasicProperties::default(),
            )
            .await?;

        debug!(exchange = %exchange, event_id = %envelope.event.id, "event published");
        Ok(())
    }
}
