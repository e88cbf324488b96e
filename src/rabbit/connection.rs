//! Connection manager — owns the broker connection and channel.
//!
//! The channel handle is written once per successful attempt and lent to
//! the publisher and consumer through [`ConnectionManager::channel`],
//! which suspends until the handle exists. State transitions are
//! announced on a broadcast channel so that readiness waiting and health
//! reporting can both observe them without polling.

use std::time::Duration;

use lapin::{Channel, Connection, ConnectionProperties};
use tokio::sync::{broadcast, watch, Mutex};
use tracing::{info, warn};

use crate::error::BusError;

/// Connectivity state of a connector.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// No usable channel exists.
    NotConnected,
    /// Connection and channel are established.
    Connected,
}

/// Notification emitted on each connection-state transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StateChange {
    /// The state just entered.
    pub new_state: ConnectionState,
}

/// How often and how patiently to attempt connecting.
///
/// The default is a single attempt: a connector that fails to connect
/// stays `NotConnected` until externally reconstructed. Callers opt
/// into bounded retry with [`ReconnectPolicy::retrying`].
#[derive(Clone, Copy, Debug)]
pub struct ReconnectPolicy {
    /// Total connection attempts before giving up.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles after each failed attempt.
    pub initial_backoff: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::from_millis(500),
        }
    }
}

impl ReconnectPolicy {
    /// Bounded-retry policy with exponential backoff.
    pub fn retrying(max_attempts: u32, initial_backoff: Duration) -> Self {
        Self {
            max_attempts,
            initial_backoff,
        }
    }
}

/// Owns the broker connection and channel for one connector.
///
/// The manager is the only writer of the channel handle; the publisher
/// and consumer borrow it through [`channel`](Self::channel) and never
/// store or mutate it themselves.
pub struct ConnectionManager {
    state_tx: broadcast::Sender<StateChange>,
    channel_tx: watch::Sender<Option<Channel>>,
    channel_rx: watch::Receiver<Option<Channel>>,
    connection: Mutex<Option<Connection>>,
}

impl Default for ConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionManager {
    /// Create a manager with no connection.
    pub fn new() -> Self {
        let (state_tx, _) = broadcast::channel(16);
        let (channel_tx, channel_rx) = watch::channel(None);
        Self {
            state_tx,
            channel_tx,
            channel_rx,
            connection: Mutex::new(None),
        }
    }

    /// Subscribe to connection-state transitions.
    pub fn observe(&self) -> broadcast::Receiver<StateChange> {
        self.state_tx.subscribe()
    }

    /// Current connectivity state.
    pub fn state(&self) -> ConnectionState {
        if self.channel_rx.borrow().is_some() {
            ConnectionState::Connected
        } else {
            ConnectionState::NotConnected
        }
    }

    /// Attempt to establish a connection and channel.
    ///
    /// Emits exactly one state notification per attempt: `Connected` on
    /// success, `NotConnected` on failure. Never returns an error — the
    /// caller observes the outcome through [`observe`](Self::observe) or
    /// [`state`](Self::state).
    pub async fn connect(&self, url: &str, policy: &ReconnectPolicy) {
        let mut backoff = policy.initial_backoff;
        let attempts = policy.max_attempts.max(1);

        for attempt in 1..=attempts {
            match self.try_connect(url).await {
                Ok((connection, channel)) => {
                    *self.connection.lock().await = Some(connection);
                    self.channel_tx.send_replace(Some(channel));
                    info!(attempt, "broker connected");
                    self.transition(ConnectionState::Connected);
                    return;
                }
                Err(e) => {
                    warn!(attempt, error = %e, "broker connection failure");
                    self.transition(ConnectionState::NotConnected);
                }
            }

            if attempt < attempts {
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }
        }
    }

    /// Borrow the channel handle, suspending until one exists.
    ///
    /// This is the one-shot readiness signal: callers that arrive before
    /// the connection attempt completes park here and resume when the
    /// handle is written. Errors only if the connector was torn down.
    pub async fn channel(&self) -> Result<Channel, BusError> {
        let mut rx = self.channel_rx.clone();
        loop {
            let ready = rx.borrow_and_update().clone();
            if let Some(channel) = ready {
                return Ok(channel);
            }
            if rx.changed().await.is_err() {
                return Err(BusError::ConnectionFailed("connector closed".to_string()));
            }
        }
    }

    /// Tear down the channel and connection.
    ///
    /// Deliveries handed out but not yet acknowledged return to the
    /// broker and become eligible for redelivery. Teardown is a terminal
    /// transition and emits no state notification.
    pub async fn close(&self) {
        let channel = self.channel_tx.send_replace(None);
        if let Some(channel) = channel {
            if let Err(e) = channel.close(200, "closing").await {
                warn!(error = %e, "channel close failure");
            }
        }

        let connection = self.connection.lock().await.take();
        if let Some(connection) = connection {
            if let Err(e) = connection.close(200, "closing").await {
                warn!(error = %e, "connection close failure");
            }
        }
    }

    async fn try_connect(&self, url: &str) -> Result<(Connection, Channel), lapin::Error> {
        let connection = Connection::connect(url, ConnectionProperties::default()).await?;
        let channel = connection.create_channel().await?;
        Ok((connection, channel))
    }

    fn transition(&self, new_state: ConnectionState) {
        // A send error just means nobody is observing.
        let _ = self.state_tx.send(StateChange { new_state });
    }
}
