//! # tether-gateway
//!
//! Client for a Discord-style push gateway over websockets.
//!
//! A [`Gateway`] dials the server, completes the Hello / Identify-or-Resume
//! handshake, keeps the connection alive with heartbeats, and delivers
//! decoded dispatch events on a bounded channel. When the connection drops,
//! goes silent, or the server asks for it, the gateway closes and reopens
//! itself, resuming the session when it can.
//!
//! ```no_run
//! use tether_gateway::GatewayBuilder;
//!
//! # async fn run() -> Result<(), tether_gateway::GatewayError> {
//! let (gateway, mut events) = GatewayBuilder::new("wss://gateway.example/?v=6", "token").build()?;
//! gateway.open().await?;
//!
//! while let Some(event) = events.recv().await {
//!     println!("{}", event.name());
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod bootstrap;
pub mod config;
mod dispatch;
pub mod error;
pub mod gateway;
pub mod identity;
pub mod pacemaker;
pub mod reconnect;
pub mod sequence;
pub mod state;
mod transport;

pub use bootstrap::{Bootstrap, GatewayBotData, SessionStartLimit};
pub use config::GatewayConfig;
pub use error::GatewayError;
pub use gateway::{AfterClose, ErrorLog, Gateway, GatewayBuilder};
pub use identity::{Handshake, Identifier};
pub use pacemaker::{Pacemaker, PacemakerHandle};
pub use reconnect::ReconnectConfig;
pub use state::{AtomicConnectionState, ConnectionState};
