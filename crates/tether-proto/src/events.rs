//! Dispatch events, keyed by the frame's event name.

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::codec::Codec;
use crate::error::ProtoError;
use crate::frame::Frame;
use crate::payloads::ShardInfo;
use crate::types::{Message, Snowflake, User};

/// Event names as they appear in the `t` field.
pub mod names {
    /// Session established after Identify.
    pub const READY: &str = "READY";
    /// Session reattached after Resume.
    pub const RESUMED: &str = "RESUMED";
    /// Message sent.
    pub const MESSAGE_CREATE: &str = "MESSAGE_CREATE";
    /// Message edited.
    pub const MESSAGE_UPDATE: &str = "MESSAGE_UPDATE";
    /// Message deleted.
    pub const MESSAGE_DELETE: &str = "MESSAGE_DELETE";
    /// User started typing.
    pub const TYPING_START: &str = "TYPING_START";
}

/// A guild that will arrive later through its own create event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnavailableGuild {
    /// Guild ID.
    pub id: Snowflake,
    /// Whether the guild is in an outage.
    #[serde(default)]
    pub unavailable: bool,
}

/// Payload of `READY`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ready {
    /// Gateway protocol version.
    #[serde(rename = "v", default)]
    pub version: u8,
    /// The connected user.
    #[serde(default)]
    pub user: User,
    /// Session ID used for resuming.
    pub session_id: String,
    /// Guilds the user is in.
    #[serde(default)]
    pub guilds: Vec<UnavailableGuild>,
    /// Shard this session was assigned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shard: Option<ShardInfo>,
}

/// Payload of `MESSAGE_DELETE`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageDelete {
    /// Deleted message.
    pub id: Snowflake,
    /// Channel it was in.
    pub channel_id: Snowflake,
    /// Guild it was in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guild_id: Option<Snowflake>,
}

/// Payload of `TYPING_START`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingStart {
    /// Channel being typed in.
    pub channel_id: Snowflake,
    /// Guild, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guild_id: Option<Snowflake>,
    /// Typing user.
    pub user_id: Snowflake,
    /// Unix time in seconds.
    pub timestamp: u64,
}

/// A dispatch whose name this crate does not model.
#[derive(Debug, Clone)]
pub struct UnknownEvent {
    /// Event name.
    pub name: String,
    /// Raw payload.
    pub data: Option<Box<RawValue>>,
}

/// Decoded dispatch event.
#[derive(Debug, Clone)]
pub enum Event {
    /// Session established.
    Ready(Box<Ready>),
    /// Session resumed.
    Resumed,
    /// Message sent.
    MessageCreate(Box<Message>),
    /// Message edited; may be partial.
    MessageUpdate(Box<Message>),
    /// Message deleted.
    MessageDelete(MessageDelete),
    /// User started typing.
    TypingStart(TypingStart),
    /// Anything else, kept undecoded.
    Unknown(UnknownEvent),
}

impl Event {
    /// Decode a dispatch frame by its event name.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame has no event name or its payload does
    /// not match the named event.
    pub fn decode<C: Codec>(codec: &C, frame: &Frame) -> Result<Self, ProtoError> {
        let name = frame
            .event_name
            .as_deref()
            .ok_or(ProtoError::MissingField("t"))?;

        let event = match name {
            names::READY => Self::Ready(Box::new(codec.decode_payload(frame)?)),
            names::RESUMED => Self::Resumed,
            names::MESSAGE_CREATE => Self::MessageCreate(Box::new(codec.decode_payload(frame)?)),
            names::MESSAGE_UPDATE => Self::MessageUpdate(Box::new(codec.decode_payload(frame)?)),
            names::MESSAGE_DELETE => Self::MessageDelete(codec.decode_payload(frame)?),
            names::TYPING_START => Self::TypingStart(codec.decode_payload(frame)?),
            other => Self::Unknown(UnknownEvent {
                name: other.to_string(),
                data: frame.data.clone(),
            }),
        };
        Ok(event)
    }

    /// The wire name of this event.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Ready(_) => names::READY,
            Self::Resumed => names::RESUMED,
            Self::MessageCreate(_) => names::MESSAGE_CREATE,
            Self::MessageUpdate(_) => names::MESSAGE_UPDATE,
            Self::MessageDelete(_) => names::MESSAGE_DELETE,
            Self::TypingStart(_) => names::TYPING_START,
            Self::Unknown(unknown) => &unknown.name,
        }
    }
}
