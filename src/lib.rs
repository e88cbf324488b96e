//! Broker-backed publish/subscribe for typed events.
//!
//! Independent services exchange typed events without direct coupling:
//! producers publish to a fanout exchange derived from an event
//! category, and each consuming service gets its own queue bound to that
//! exchange — instances of one service compete on the shared queue,
//! distinct services each receive every event.
//!
//! ```text
//!                    event__foo-bar (fanout)
//!   publish ──────────────┬────────────────────┐
//!                         ▼                    ▼
//!        consumer__foo-bar__audit   consumer__foo-bar__billing
//!                         │                    │
//!                  audit instances      billing instances
//!                 (competing consumers on each queue)
//! ```
//!
//! Delivery is at-least-once: each message gets exactly one
//! acknowledgment decision, and failed or malformed deliveries are
//! returned for redelivery (or quarantined once their retry budget is
//! spent). The [`MemoryEventBus`] realizes the identical contract
//! without a broker, for local testing.

mod bus;
mod envelope;
mod error;
mod event;
mod memory;
#[cfg(feature = "amqp")]
mod rabbit;
pub mod topology;

pub use bus::{handler, EventBus, EventHandler, HandlerError, HandlerFuture, HandlerOutcome};
pub use envelope::{DeliveryMeta, Envelope, DEFAULT_RETRIES};
pub use error::BusError;
pub use event::{Event, EventCategory};
pub use memory::MemoryEventBus;
#[cfg(feature = "amqp")]
pub use rabbit::{
    ConnectionManager, ConnectionState, RabbitEventBus, RabbitOptions, ReconnectPolicy,
    StateChange,
};
