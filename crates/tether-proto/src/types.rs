//! Entities carried inside dispatch events.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ProtoError;

/// A 64-bit entity identifier, sent over the wire as a decimal string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Snowflake(u64);

impl Snowflake {
    /// Wrap a raw identifier.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// The raw identifier.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Zero is used by the protocol as "absent".
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }

    /// Parse a `Snowflake` from its decimal form.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not a valid u64.
    pub fn parse(s: &str) -> Result<Self, ProtoError> {
        s.parse::<u64>()
            .map(Self)
            .map_err(|e| ProtoError::Validation(format!("invalid snowflake {s:?}: {e}")))
    }
}

impl From<u64> for Snowflake {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for Snowflake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for Snowflake {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Snowflake {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SnowflakeVisitor;

        impl Visitor<'_> for SnowflakeVisitor {
            type Value = Snowflake;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a snowflake as a string or integer")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                Ok(Snowflake(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
                u64::try_from(v)
                    .map(Snowflake)
                    .map_err(|_| E::custom("negative snowflake"))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                v.parse::<u64>().map(Snowflake).map_err(E::custom)
            }

            fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
                Ok(Snowflake(0))
            }
        }

        deserializer.deserialize_any(SnowflakeVisitor)
    }
}

/// A duration expressed in milliseconds on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Milliseconds(u64);

impl Milliseconds {
    /// Wrap a millisecond count.
    #[must_use]
    pub const fn new(ms: u64) -> Self {
        Self(ms)
    }

    /// The millisecond count.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Convert to a [`Duration`].
    #[must_use]
    pub const fn as_duration(self) -> Duration {
        Duration::from_millis(self.0)
    }
}

impl From<Duration> for Milliseconds {
    fn from(d: Duration) -> Self {
        Self(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }
}

/// A user account.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct User {
    /// User ID.
    pub id: Snowflake,
    /// Account name.
    pub username: String,
    /// Four-digit tag.
    pub discriminator: String,
    /// Avatar hash.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    /// Whether the account is a bot.
    pub bot: bool,
}

/// Kind of message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum MessageType {
    /// Regular message.
    #[default]
    Default,
    /// Recipient added to a group DM.
    RecipientAdd,
    /// Recipient removed from a group DM.
    RecipientRemove,
    /// Call started.
    Call,
    /// Channel renamed.
    ChannelNameChange,
    /// Channel icon changed.
    ChannelIconChange,
    /// Message pinned.
    ChannelPinnedMessage,
    /// Member joined the guild.
    GuildMemberJoin,
    /// Guild boosted.
    NitroBoost,
    /// Guild reached boost tier 1.
    NitroTier1,
    /// Guild reached boost tier 2.
    NitroTier2,
    /// Guild reached boost tier 3.
    NitroTier3,
    /// Channel follow added.
    ChannelFollowAdd,
    /// Guild disqualified from discovery.
    GuildDiscoveryDisqualified,
    /// Guild requalified for discovery.
    GuildDiscoveryRequalified,
    /// A type this crate does not know about.
    Other(u8),
}

impl From<u8> for MessageType {
    fn from(v: u8) -> Self {
        match v {
            0 => Self::Default,
            1 => Self::RecipientAdd,
            2 => Self::RecipientRemove,
            3 => Self::Call,
            4 => Self::ChannelNameChange,
            5 => Self::ChannelIconChange,
            6 => Self::ChannelPinnedMessage,
            7 => Self::GuildMemberJoin,
            8 => Self::NitroBoost,
            9 => Self::NitroTier1,
            10 => Self::NitroTier2,
            11 => Self::NitroTier3,
            12 => Self::ChannelFollowAdd,
            13 => Self::GuildDiscoveryDisqualified,
            14 => Self::GuildDiscoveryRequalified,
            other => Self::Other(other),
        }
    }
}

impl From<MessageType> for u8 {
    fn from(t: MessageType) -> Self {
        match t {
            MessageType::Default => 0,
            MessageType::RecipientAdd => 1,
            MessageType::RecipientRemove => 2,
            MessageType::Call => 3,
            MessageType::ChannelNameChange => 4,
            MessageType::ChannelIconChange => 5,
            MessageType::ChannelPinnedMessage => 6,
            MessageType::GuildMemberJoin => 7,
            MessageType::NitroBoost => 8,
            MessageType::NitroTier1 => 9,
            MessageType::NitroTier2 => 10,
            MessageType::NitroTier3 => 11,
            MessageType::ChannelFollowAdd => 12,
            MessageType::GuildDiscoveryDisqualified => 13,
            MessageType::GuildDiscoveryRequalified => 14,
            MessageType::Other(v) => v,
        }
    }
}

/// Message flag bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageFlags(u32);

impl MessageFlags {
    /// Published to following channels.
    pub const CROSSPOSTED: Self = Self(1);
    /// Originated from a followed channel.
    pub const IS_CROSSPOST: Self = Self(1 << 1);
    /// Embeds are hidden.
    pub const SUPPRESS_EMBEDS: Self = Self(1 << 2);
    /// The crossposted source was deleted.
    pub const SOURCE_MESSAGE_DELETED: Self = Self(1 << 3);
    /// System urgent message.
    pub const URGENT: Self = Self(1 << 4);

    /// Raw bits.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Whether every bit of `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

/// A file attached to a message.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Attachment {
    /// Attachment ID.
    pub id: Snowflake,
    /// File name.
    pub filename: String,
    /// Size in bytes.
    pub size: u64,
    /// Source URL.
    pub url: String,
    /// Proxied URL.
    pub proxy_url: String,
    /// Image height, if an image.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    /// Image width, if an image.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
}

/// A custom or unicode emoji.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Emoji {
    /// Emoji ID; absent for unicode emoji.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Snowflake>,
    /// Emoji name or the unicode character.
    pub name: String,
}

/// Reactions of one emoji on a message.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Reaction {
    /// Times this emoji was used.
    pub count: u32,
    /// Whether the current user reacted.
    pub me: bool,
    /// The emoji.
    pub emoji: Emoji,
}

/// Reference to the message this one crossposts or replies to.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageReference {
    /// Source channel.
    pub channel_id: Snowflake,
    /// Source message; may be absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<Snowflake>,
    /// Source guild; may be absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guild_id: Option<Snowflake>,
}

/// A chat message.
///
/// Every field has a default so partial payloads (message updates only carry
/// what changed) still decode.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Message {
    /// Message ID.
    pub id: Snowflake,
    /// Message kind.
    #[serde(rename = "type")]
    pub kind: MessageType,
    /// Channel the message was sent in.
    pub channel_id: Snowflake,
    /// Guild, absent for direct messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guild_id: Option<Snowflake>,
    /// Author. For webhook messages this is the webhook.
    pub author: User,
    /// Text content.
    pub content: String,
    /// When the message was sent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// When the message was last edited.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edited_timestamp: Option<DateTime<Utc>>,
    /// Text-to-speech.
    pub tts: bool,
    /// Pinned in its channel.
    pub pinned: bool,
    /// Mentioned users.
    pub mentions: Vec<User>,
    /// Mentioned role IDs.
    #[serde(rename = "mention_roles")]
    pub mention_role_ids: Vec<Snowflake>,
    /// Whether `@everyone` was mentioned.
    pub mention_everyone: bool,
    /// Attached files.
    pub attachments: Vec<Attachment>,
    /// Embeds, kept as raw JSON.
    pub embeds: Vec<serde_json::Value>,
    /// Reactions.
    pub reactions: Vec<Reaction>,
    /// Client nonce used to confirm delivery.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    /// Set when a webhook produced the message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook_id: Option<Snowflake>,
    /// Crosspost or reply reference.
    #[serde(rename = "message_reference", skip_serializing_if = "Option::is_none")]
    pub reference: Option<MessageReference>,
    /// Flag bits.
    pub flags: MessageFlags,
}

impl Message {
    /// Client link to this message. Direct messages use the `@me` guild.
    #[must_use]
    pub fn url(&self) -> String {
        let guild = match self.guild_id {
            Some(id) if id.is_valid() => id.to_string(),
            _ => "@me".to_string(),
        };
        format!(
            "https://discord.com/channels/{guild}/{}/{}",
            self.channel_id, self.id
        )
    }
}
