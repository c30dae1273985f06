//! Handshake payloads: Hello, Identify and Resume.

use serde::{Deserialize, Serialize};

use crate::intents::Intents;
use crate::types::Milliseconds;

/// Payload of the first server frame (opcode 10).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hello {
    /// How often the client must heartbeat.
    pub heartbeat_interval: Milliseconds,
}

/// Connection properties reported on Identify.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifyProperties {
    /// Operating system.
    #[serde(rename = "$os")]
    pub os: String,
    /// Library name.
    #[serde(rename = "$browser")]
    pub browser: String,
    /// Library name.
    #[serde(rename = "$device")]
    pub device: String,
}

impl Default for IdentifyProperties {
    fn default() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            browser: "tether".to_string(),
            device: "tether".to_string(),
        }
    }
}

/// Shard this session handles, sent as `[shard_id, shard_count]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "[u32; 2]", into = "[u32; 2]")]
pub struct ShardInfo {
    /// Zero-based shard index.
    pub id: u32,
    /// Total number of shards.
    pub count: u32,
}

impl ShardInfo {
    /// Create shard info.
    #[must_use]
    pub const fn new(id: u32, count: u32) -> Self {
        Self { id, count }
    }
}

impl From<[u32; 2]> for ShardInfo {
    fn from([id, count]: [u32; 2]) -> Self {
        Self { id, count }
    }
}

impl From<ShardInfo> for [u32; 2] {
    fn from(shard: ShardInfo) -> Self {
        [shard.id, shard.count]
    }
}

/// Starts a brand-new session (opcode 2).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identify {
    /// Authentication token.
    pub token: String,
    /// Connection properties.
    pub properties: IdentifyProperties,
    /// Member count above which offline members are not sent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub large_threshold: Option<u32>,
    /// Shard assignment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shard: Option<ShardInfo>,
    /// Subscribed intents.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intents: Option<Intents>,
}

/// Reattaches to an existing session (opcode 6).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resume {
    /// Authentication token.
    pub token: String,
    /// Session being resumed.
    pub session_id: String,
    /// Last sequence number received.
    pub seq: u64,
}
