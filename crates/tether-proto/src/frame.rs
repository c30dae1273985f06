//! The `{op, d, s, t}` envelope carried by every gateway message.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

/// Gateway operation codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum OpCode {
    /// An event was dispatched (receive).
    Dispatch,
    /// Keepalive; sent by the client, may be requested by the server.
    Heartbeat,
    /// Starts a new session.
    Identify,
    /// Updates the client's presence (send).
    PresenceUpdate,
    /// Joins, moves or leaves voice channels (send).
    VoiceStateUpdate,
    /// Reattaches to a previous session.
    Resume,
    /// The server asks the client to reconnect and resume.
    Reconnect,
    /// Requests offline guild members (send).
    RequestGuildMembers,
    /// The stored session can no longer be resumed.
    InvalidSession,
    /// First frame after connecting; carries the heartbeat interval.
    Hello,
    /// The server acknowledged a heartbeat.
    HeartbeatAck,
    /// Any opcode this crate does not know about.
    Unknown(u8),
}

impl OpCode {
    /// Numeric wire value.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::Dispatch => 0,
            Self::Heartbeat => 1,
            Self::Identify => 2,
            Self::PresenceUpdate => 3,
            Self::VoiceStateUpdate => 4,
            Self::Resume => 6,
            Self::Reconnect => 7,
            Self::RequestGuildMembers => 8,
            Self::InvalidSession => 9,
            Self::Hello => 10,
            Self::HeartbeatAck => 11,
            Self::Unknown(code) => code,
        }
    }

    /// Short human-readable name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Dispatch => "Dispatch",
            Self::Heartbeat => "Heartbeat",
            Self::Identify => "Identify",
            Self::PresenceUpdate => "PresenceUpdate",
            Self::VoiceStateUpdate => "VoiceStateUpdate",
            Self::Resume => "Resume",
            Self::Reconnect => "Reconnect",
            Self::RequestGuildMembers => "RequestGuildMembers",
            Self::InvalidSession => "InvalidSession",
            Self::Hello => "Hello",
            Self::HeartbeatAck => "HeartbeatAck",
            Self::Unknown(_) => "Unknown",
        }
    }
}

impl From<u8> for OpCode {
    fn from(code: u8) -> Self {
        match code {
            0 => Self::Dispatch,
            1 => Self::Heartbeat,
            2 => Self::Identify,
            3 => Self::PresenceUpdate,
            4 => Self::VoiceStateUpdate,
            6 => Self::Resume,
            7 => Self::Reconnect,
            8 => Self::RequestGuildMembers,
            9 => Self::InvalidSession,
            10 => Self::Hello,
            11 => Self::HeartbeatAck,
            other => Self::Unknown(other),
        }
    }
}

impl From<OpCode> for u8 {
    fn from(op: OpCode) -> Self {
        op.code()
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.code())
    }
}

/// One gateway message.
///
/// The payload stays undecoded until a consumer asks for a concrete type,
/// so frames can be routed on `op` and `t` alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    /// Operation code.
    pub op: OpCode,
    /// Raw payload.
    #[serde(rename = "d", default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Box<RawValue>>,
    /// Sequence number, present on dispatch frames.
    #[serde(rename = "s", default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u64>,
    /// Event name, present on dispatch frames.
    #[serde(rename = "t", default, skip_serializing_if = "Option::is_none")]
    pub event_name: Option<String>,
}

impl Frame {
    /// Create a frame with no payload.
    #[must_use]
    pub const fn new(op: OpCode) -> Self {
        Self {
            op,
            data: None,
            sequence: None,
            event_name: None,
        }
    }

    /// Attach an already-encoded payload.
    #[must_use]
    pub fn with_data(mut self, data: Box<RawValue>) -> Self {
        self.data = Some(data);
        self
    }

    /// Attach a sequence number.
    #[must_use]
    pub const fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = Some(sequence);
        self
    }

    /// Attach an event name.
    #[must_use]
    pub fn with_event_name(mut self, name: impl Into<String>) -> Self {
        self.event_name = Some(name.into());
        self
    }

    /// Payload bytes, if any.
    #[must_use]
    pub fn data_bytes(&self) -> Option<&[u8]> {
        self.data.as_deref().map(|raw| raw.get().as_bytes())
    }

    /// Whether this is a dispatch frame named `name`.
    #[must_use]
    pub fn is_dispatch_of(&self, name: &str) -> bool {
        self.op == OpCode::Dispatch && self.event_name.as_deref() == Some(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(0, OpCode::Dispatch ; "dispatch")]
    #[test_case(1, OpCode::Heartbeat ; "heartbeat")]
    #[test_case(2, OpCode::Identify ; "identify")]
    #[test_case(6, OpCode::Resume ; "resume")]
    #[test_case(7, OpCode::Reconnect ; "reconnect")]
    #[test_case(9, OpCode::InvalidSession ; "invalid session")]
    #[test_case(10, OpCode::Hello ; "hello")]
    #[test_case(11, OpCode::HeartbeatAck ; "heartbeat ack")]
    #[test_case(5, OpCode::Unknown(5) ; "unassigned")]
    #[test_case(42, OpCode::Unknown(42) ; "out of range")]
    fn test_opcode_from_wire(code: u8, expected: OpCode) {
        let op = OpCode::from(code);
        assert_eq!(op, expected);
        assert_eq!(u8::from(op), code);
    }

    #[test]
    fn test_opcode_display() {
        assert_eq!(OpCode::Hello.to_string(), "Hello (10)");
        assert_eq!(OpCode::Unknown(99).to_string(), "Unknown (99)");
    }

    #[test]
    fn test_frame_parses_dispatch() {
        let json = r#"{"op":0,"d":{"content":"hi"},"s":42,"t":"MESSAGE_CREATE"}"#;
        let frame: Frame = serde_json::from_str(json).unwrap();

        assert_eq!(frame.op, OpCode::Dispatch);
        assert_eq!(frame.sequence, Some(42));
        assert!(frame.is_dispatch_of("MESSAGE_CREATE"));
        assert_eq!(frame.data_bytes(), Some(br#"{"content":"hi"}"#.as_slice()));
    }

    #[test]
    fn test_frame_null_fields_are_absent() {
        let json = r#"{"op":11,"d":null,"s":null,"t":null}"#;
        let frame: Frame = serde_json::from_str(json).unwrap();

        assert_eq!(frame.op, OpCode::HeartbeatAck);
        assert!(frame.data.is_none());
        assert!(frame.sequence.is_none());
        assert!(frame.event_name.is_none());
    }

    #[test]
    fn test_frame_serialization_skips_empty_fields() {
        let frame = Frame::new(OpCode::Heartbeat);
        let json = serde_json::to_string(&frame).unwrap();
        assert_eq!(json, r#"{"op":1}"#);
    }

    #[test]
    fn test_unknown_opcode_survives_decoding() {
        let frame: Frame = serde_json::from_str(r#"{"op":200}"#).unwrap();
        assert_eq!(frame.op, OpCode::Unknown(200));
        assert!(!frame.is_dispatch_of("READY"));
    }
}
