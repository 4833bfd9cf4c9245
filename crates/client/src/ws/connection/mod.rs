//! Push channel connection: state, reconnect policy, command handle and the
//! signals a live connection reports back.
//!
//! The platform-specific socket loop lives in `connection_native` /
//! `connection_wasm`; both implement [`Connector`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_channel::mpsc::UnboundedSender;
use rideshare_shared::{ClientCommand, ServerEvent, WsEnvelope};
use thiserror::Error;

/// Connection state for the push channel
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
    Failed { reason: String },
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }

    pub fn is_connecting(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Reconnecting { .. }
        )
    }
}

/// Configuration for auto-reconnect behavior
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    /// Maximum number of reconnect attempts (0 = infinite)
    pub max_attempts: u32,
    /// Initial delay in milliseconds
    pub initial_delay_ms: u32,
    /// Maximum delay in milliseconds
    pub max_delay_ms: u32,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 0,
            initial_delay_ms: 1000,
            max_delay_ms: 30000,
            backoff_multiplier: 1.5,
        }
    }
}

impl ReconnectConfig {
    /// Calculate delay for a given attempt number
    pub fn delay_for_attempt(&self, attempt: u32) -> u32 {
        let delay = self.initial_delay_ms as f32 * self.backoff_multiplier.powi(attempt as i32);
        (delay as u32).min(self.max_delay_ms)
    }

    pub fn exhausted(&self, attempt: u32) -> bool {
        self.max_attempts > 0 && attempt >= self.max_attempts
    }

    /// Whether a session that stayed up this long resets the backoff.
    /// Shorter sessions keep counting, so a server that accepts and then
    /// drops the socket is retried with growing delays.
    pub fn recovered_after(&self, uptime: Duration) -> bool {
        uptime >= Duration::from_millis(self.max_delay_ms as u64)
    }

    pub fn gave_up_reason(&self) -> String {
        format!("Max reconnect attempts ({}) exceeded", self.max_attempts)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// The transport could not be constructed at all.
    #[error("push channel unavailable: {0}")]
    Unavailable(String),
    #[error("push channel closed")]
    Closed,
}

/// What a running connection reports back to its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelSignal {
    Connected,
    Disconnected { reason: Option<String> },
    Error(String),
    Event(WsEnvelope<ServerEvent>),
}

/// Cloneable handle for sending control commands through the connection.
#[derive(Clone)]
pub struct ChannelHandle {
    sender: UnboundedSender<WsEnvelope<ClientCommand>>,
    closed: Arc<AtomicBool>,
}

impl ChannelHandle {
    pub fn new(sender: UnboundedSender<WsEnvelope<ClientCommand>>) -> Self {
        Self {
            sender,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Send a command to the server
    pub fn send(&self, cmd: ClientCommand) -> Result<(), ChannelError> {
        if self.is_closed() {
            return Err(ChannelError::Closed);
        }
        crate::log_debug!("ChannelHandle::send: {:?}", cmd);
        let envelope = WsEnvelope {
            id: uuid::Uuid::new_v4().to_string(),
            payload: cmd,
            ts: Utc::now(),
            correlation_id: None,
        };
        self.sender
            .unbounded_send(envelope)
            .map_err(|_| ChannelError::Closed)
    }

    pub fn join_ride_room(&self, ride_id: &str) -> Result<(), ChannelError> {
        self.send(ClientCommand::JoinRideRoom {
            ride_id: ride_id.to_string(),
        })
    }

    pub fn leave_ride_room(&self, ride_id: &str) -> Result<(), ChannelError> {
        self.send(ClientCommand::LeaveRideRoom {
            ride_id: ride_id.to_string(),
        })
    }

    /// Stop the connection loop. Further sends fail with `Closed`.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.sender.close_channel();
    }

    /// True once the owner closed the handle or the connection loop stopped
    /// for good.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || self.sender.is_closed()
    }
}

impl std::fmt::Debug for ChannelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelHandle")
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Opens the underlying transport.
///
/// `open` returns immediately with a handle; connection progress and inbound
/// events arrive later on `signals`.
pub trait Connector {
    fn open(&self, signals: UnboundedSender<ChannelSignal>) -> Result<ChannelHandle, ChannelError>;
}

// Include platform-specific implementation
#[cfg(target_arch = "wasm32")]
mod connection_wasm;
#[cfg(target_arch = "wasm32")]
pub use connection_wasm::WsConnector;

#[cfg(not(target_arch = "wasm32"))]
mod connection_native;
#[cfg(not(target_arch = "wasm32"))]
pub use connection_native::WsConnector;
