//! Connection state types.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Observable state of a gateway connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection.
    Idle,
    /// Opening the websocket.
    Dialing,
    /// Waiting for the server's Hello.
    AwaitingHello,
    /// Sending Identify or Resume.
    Authenticating,
    /// Waiting for READY or RESUMED.
    AwaitingConfirm,
    /// Handshake done; events are flowing.
    Connected,
    /// Tearing down workers and the websocket.
    Closing,
}

impl ConnectionState {
    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Dialing,
            2 => Self::AwaitingHello,
            3 => Self::Authenticating,
            4 => Self::AwaitingConfirm,
            5 => Self::Connected,
            _ => Self::Closing,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Dialing => "dialing",
            Self::AwaitingHello => "awaiting-hello",
            Self::Authenticating => "authenticating",
            Self::AwaitingConfirm => "awaiting-confirm",
            Self::Connected => "connected",
            Self::Closing => "closing",
        };
        f.write_str(name)
    }
}

/// Atomic wrapper for connection state.
#[derive(Debug)]
pub struct AtomicConnectionState(AtomicU8);

impl AtomicConnectionState {
    /// Create a new atomic state.
    #[must_use]
    pub const fn new(state: ConnectionState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    /// Load the current state.
    #[must_use]
    pub fn load(&self) -> ConnectionState {
        ConnectionState::from_u8(self.0.load(Ordering::SeqCst))
    }

    /// Store a new state.
    pub fn store(&self, state: ConnectionState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }
}

impl Default for AtomicConnectionState {
    fn default() -> Self {
        Self::new(ConnectionState::Idle)
    }
}
