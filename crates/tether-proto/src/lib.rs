//! # tether-proto
//!
//! Wire vocabulary for the tether push gateway: the `{op, d, s, t}` frame
//! envelope, opcodes, handshake payloads, dispatch events and the entities
//! they carry. Nothing in here performs I/O.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod codec;
pub mod error;
pub mod events;
pub mod frame;
pub mod intents;
pub mod payloads;
pub mod types;

pub use codec::{Codec, JsonCodec};
pub use error::ProtoError;
pub use events::{Event, MessageDelete, Ready, TypingStart, UnavailableGuild, UnknownEvent};
pub use frame::{Frame, OpCode};
pub use intents::Intents;
pub use payloads::{Hello, Identify, IdentifyProperties, Resume, ShardInfo};
pub use types::{Message, MessageFlags, MessageType, Milliseconds, Snowflake, User};
