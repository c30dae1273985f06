//! Error types for tether-gateway.

use std::time::Duration;

use tether_proto::{OpCode, ProtoError};
use thiserror::Error;

/// Errors that can occur while running a gateway connection.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Dialing the websocket failed.
    #[error("failed to dial gateway: {0}")]
    Dial(String),

    /// Reading from or writing to the websocket failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// A bounded wait ran out.
    #[error("timed out during {stage} after {after:?}")]
    Timeout {
        /// What was being waited on.
        stage: &'static str,
        /// The bound that was exceeded.
        after: Duration,
    },

    /// A frame arrived with a different opcode than the handshake requires.
    #[error("unexpected opcode: expected {expected}, got {got}")]
    UnexpectedOpCode {
        /// Opcode the handshake required.
        expected: OpCode,
        /// Opcode that arrived.
        got: OpCode,
    },

    /// A resume was attempted without a session ID or sequence number.
    #[error("missing session ID or sequence for resuming")]
    MissingForResume,

    /// The pacemaker saw no heartbeat ack for more than two intervals.
    #[error("no heartbeat replied")]
    Dead,

    /// The inbound frame stream ended.
    #[error("event stream closed")]
    StreamClosed,

    /// The server asked the client to reconnect.
    #[error("gateway requested a reconnect")]
    ReconnectRequested,

    /// The server declared the session no longer resumable.
    #[error("session invalidated by the gateway")]
    InvalidSession,

    /// No connection is open.
    #[error("gateway is not connected")]
    NotConnected,

    /// The output event queue stayed full past the write timeout.
    #[error("event queue is full, dropped {0}")]
    QueueFull(String),

    /// The output event queue receiver was dropped.
    #[error("event queue receiver was dropped")]
    QueueClosed,

    /// The configured retry limit was exhausted.
    #[error("max reconnect attempts reached ({0})")]
    MaxAttempts(u32),

    /// A bootstrap HTTP call failed.
    #[error("bootstrap request failed: {0}")]
    Bootstrap(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Protocol error.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtoError),
}

impl GatewayError {
    /// Whether this error came from the remote telling us to reconnect,
    /// as opposed to the connection failing.
    #[must_use]
    pub const fn is_remote_request(&self) -> bool {
        matches!(self, Self::ReconnectRequested | Self::InvalidSession)
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        Self::Bootstrap(err.to_string())
    }
}
