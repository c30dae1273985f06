//! Credentials and session memory used for the handshake.

use std::fmt;

use parking_lot::Mutex;
use tether_proto::{Identify, IdentifyProperties, Intents, Resume, ShardInfo};

use crate::error::GatewayError;

/// The frame the client should send after Hello.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handshake {
    /// Start a new session.
    Identify(Identify),
    /// Reattach to the remembered session.
    Resume(Resume),
}

/// Everything needed to authenticate, plus the session ID learned from READY.
pub struct Identifier {
    token: String,
    properties: IdentifyProperties,
    shard: Option<ShardInfo>,
    intents: Option<Intents>,
    large_threshold: Option<u32>,
    session_id: Mutex<Option<String>>,
}

impl Identifier {
    /// Create an identifier for `token` with default properties.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            properties: IdentifyProperties::default(),
            shard: None,
            intents: None,
            large_threshold: None,
            session_id: Mutex::new(None),
        }
    }

    /// Override the reported connection properties.
    #[must_use]
    pub fn with_properties(mut self, properties: IdentifyProperties) -> Self {
        self.properties = properties;
        self
    }

    /// Claim a shard.
    #[must_use]
    pub fn with_shard(mut self, shard: ShardInfo) -> Self {
        self.shard = Some(shard);
        self
    }

    /// Subscribe to a set of intents.
    #[must_use]
    pub fn with_intents(mut self, intents: Intents) -> Self {
        self.intents = Some(intents);
        self
    }

    /// Set the large guild threshold.
    #[must_use]
    pub fn with_large_threshold(mut self, threshold: u32) -> Self {
        self.large_threshold = Some(threshold);
        self
    }

    /// Session ID remembered from the last READY.
    #[must_use]
    pub fn session_id(&self) -> Option<String> {
        self.session_id.lock().clone()
    }

    /// Remember the session ID from READY.
    pub fn set_session_id(&self, session_id: impl Into<String>) {
        *self.session_id.lock() = Some(session_id.into());
    }

    /// Forget the session so the next handshake identifies afresh.
    pub fn clear_session(&self) {
        *self.session_id.lock() = None;
    }

    /// Build the Identify payload.
    #[must_use]
    pub fn identify(&self) -> Identify {
        Identify {
            token: self.token.clone(),
            properties: self.properties.clone(),
            large_threshold: self.large_threshold,
            shard: self.shard,
            intents: self.intents,
        }
    }

    /// Build the Resume payload for the remembered session.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::MissingForResume`] if there is no session ID or
    /// no sequence number.
    pub fn resume(&self, last_seq: Option<u64>) -> Result<Resume, GatewayError> {
        let session_id = self.session_id().ok_or(GatewayError::MissingForResume)?;
        let seq = last_seq.ok_or(GatewayError::MissingForResume)?;
        Ok(Resume {
            token: self.token.clone(),
            session_id,
            seq,
        })
    }

    /// Choose between Identify and Resume.
    ///
    /// With no remembered session the answer is always Identify. With one,
    /// the answer is Resume, which fails if no sequence has been seen.
    pub fn next_handshake(&self, last_seq: Option<u64>) -> Result<Handshake, GatewayError> {
        if self.session_id.lock().is_none() {
            return Ok(Handshake::Identify(self.identify()));
        }
        self.resume(last_seq).map(Handshake::Resume)
    }
}

impl fmt::Debug for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identifier")
            .field("token", &"<redacted>")
            .field("properties", &self.properties)
            .field("shard", &self.shard)
            .field("intents", &self.intents)
            .field("large_threshold", &self.large_threshold)
            .field("session_id", &self.session_id.lock())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identify_without_session() {
        let identifier = Identifier::new("secret")
            .with_shard(ShardInfo::new(0, 2))
            .with_intents(Intents::GUILD_MESSAGES);

        let Handshake::Identify(identify) = identifier.next_handshake(Some(10)).unwrap() else {
            panic!("expected Identify");
        };
        assert_eq!(identify.token, "secret");
        assert_eq!(identify.shard, Some(ShardInfo::new(0, 2)));
        assert_eq!(identify.intents, Some(Intents::GUILD_MESSAGES));
    }

    #[test]
    fn test_resume_with_session() {
        let identifier = Identifier::new("secret");
        identifier.set_session_id("abc");

        let handshake = identifier.next_handshake(Some(42)).unwrap();
        assert_eq!(
            handshake,
            Handshake::Resume(Resume {
                token: "secret".to_string(),
                session_id: "abc".to_string(),
                seq: 42,
            })
        );
    }

    #[test]
    fn test_resume_without_sequence_fails() {
        let identifier = Identifier::new("secret");
        identifier.set_session_id("abc");

        let err = identifier.next_handshake(None).unwrap_err();
        assert!(matches!(err, GatewayError::MissingForResume));
    }

    #[test]
    fn test_resume_without_session_fails() {
        let identifier = Identifier::new("secret");
        assert!(matches!(
            identifier.resume(Some(3)),
            Err(GatewayError::MissingForResume)
        ));
    }

    #[test]
    fn test_clear_session_falls_back_to_identify() {
        let identifier = Identifier::new("secret");
        identifier.set_session_id("abc");
        identifier.clear_session();

        assert!(identifier.session_id().is_none());
        assert!(matches!(
            identifier.next_handshake(Some(7)).unwrap(),
            Handshake::Identify(_)
        ));
    }

    #[test]
    fn test_debug_redacts_token() {
        let rendered = format!("{:?}", Identifier::new("hunter2"));
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }
}
