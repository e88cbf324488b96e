//! The wire envelope — an event plus its delivery bookkeeping.
//!
//! The envelope is what actually crosses the broker: UTF-8 JSON of
//! `{event, meta}`. Both bus realizations encode through this module, so
//! a payload that survives the in-memory bus survives the broker too.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::BusError;
use crate::event::Event;

/// Retry ceiling written into every fresh envelope.
pub const DEFAULT_RETRIES: u32 = 10;

/// Delivery bookkeeping carried alongside the event.
///
/// Reserved for retry-aware processing: a fresh envelope starts at
/// `attempts = 0, failures = 0` with `retries` set to the configured
/// ceiling. The publish path writes these fields but does not consume
/// them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryMeta {
    /// Deliveries attempted so far.
    pub attempts: u32,
    /// Ceiling after which the delivery is quarantined instead of retried.
    pub retries: u32,
    /// Failed handler invocations so far.
    pub failures: u32,
}

impl DeliveryMeta {
    /// Bookkeeping for an envelope that has never been delivered.
    pub fn fresh() -> Self {
        Self {
            attempts: 0,
            retries: DEFAULT_RETRIES,
            failures: 0,
        }
    }

    /// Whether this delivery has used up its retry budget.
    pub fn exhausted(&self) -> bool {
        self.attempts >= self.retries
    }
}

impl Default for DeliveryMeta {
    fn default() -> Self {
        Self::fresh()
    }
}

/// The unit actually placed on the wire.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    /// The event being transmitted.
    pub event: Event<T>,
    /// Delivery bookkeeping.
    pub meta: DeliveryMeta,
}

impl<T> Envelope<T> {
    /// Wrap an event in a fresh envelope.
    pub fn wrap(event: Event<T>) -> Self {
        Self {
            event,
            meta: DeliveryMeta::fresh(),
        }
    }
}

impl<T: Serialize> Envelope<T> {
    /// Serialize to the UTF-8 JSON wire format.
    pub fn to_bytes(&self) -> Result<Vec<u8>, BusError> {
        serde_json::to_vec(self).map_err(|e| BusError::SerializationFailed(e.to_string()))
    }
}

impl<T: DeserializeOwned> Envelope<T> {
    /// Parse an envelope from a raw delivery body.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, BusError> {
        serde_json::from_slice(bytes).map_err(|e| BusError::ParseFailed(e.to_string()))
    }
}
