//! Error type for bus operations.

use std::error::Error;
use std::fmt;

/// Error type for bus operations.
///
/// Connection failures at construction time are *not* reported through
/// this type — they surface as a `NotConnected` state notification, and
/// the caller decides whether prolonged disconnection is fatal.
#[derive(Debug)]
pub enum BusError {
    /// Connection to the broker failed or the connector was torn down
    ConnectionFailed(String),
    /// The bus was used before `init` established it
    NotInitialized,
    /// Serialization of an envelope failed
    SerializationFailed(String),
    /// A delivery body could not be parsed as an envelope
    ParseFailed(String),
    /// The broker rejected an operation
    Rejected(String),
    /// Other error
    Other(Box<dyn Error + Send + Sync>),
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusError::ConnectionFailed(msg) => write!(f, "Connection failed: {}", msg),
            BusError::NotInitialized => write!(f, "Bus not initialized: call init first"),
            BusError::SerializationFailed(msg) => write!(f, "Serialization failed: {}", msg),
            BusError::ParseFailed(msg) => write!(f, "Envelope parse failed: {}", msg),
            BusError::Rejected(msg) => write!(f, "Operation rejected: {}", msg),
            BusError::Other(e) => write!(f, "Bus error: {}", e),
        }
    }
}

impl Error for BusError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            BusError::Other(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

#[cfg(feature = "amqp")]
impl From<lapin::Error> for BusError {
    fn from(err: lapin::Error) -> Self {
        BusError::Other(Box::new(err))
    }
}
