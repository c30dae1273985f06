//! Gateway intents bitmask.

use std::ops::{BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};

/// Which event groups the session subscribes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Intents(u32);

impl Intents {
    /// Guild create/update/delete, roles, channels.
    pub const GUILDS: Self = Self(1);
    /// Member add/update/remove. Privileged.
    pub const GUILD_MEMBERS: Self = Self(1 << 1);
    /// Ban add/remove.
    pub const GUILD_BANS: Self = Self(1 << 2);
    /// Emoji updates.
    pub const GUILD_EMOJIS: Self = Self(1 << 3);
    /// Integration updates.
    pub const GUILD_INTEGRATIONS: Self = Self(1 << 4);
    /// Webhook updates.
    pub const GUILD_WEBHOOKS: Self = Self(1 << 5);
    /// Invite create/delete.
    pub const GUILD_INVITES: Self = Self(1 << 6);
    /// Voice state updates.
    pub const GUILD_VOICE_STATES: Self = Self(1 << 7);
    /// Presence updates. Privileged.
    pub const GUILD_PRESENCES: Self = Self(1 << 8);
    /// Guild message create/update/delete.
    pub const GUILD_MESSAGES: Self = Self(1 << 9);
    /// Guild message reactions.
    pub const GUILD_MESSAGE_REACTIONS: Self = Self(1 << 10);
    /// Guild typing start.
    pub const GUILD_MESSAGE_TYPING: Self = Self(1 << 11);
    /// Direct message create/update/delete.
    pub const DIRECT_MESSAGES: Self = Self(1 << 12);
    /// Direct message reactions.
    pub const DIRECT_MESSAGE_REACTIONS: Self = Self(1 << 13);
    /// Direct message typing start.
    pub const DIRECT_MESSAGE_TYPING: Self = Self(1 << 14);

    /// No intents.
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Build from raw bits.
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

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

impl BitOr for Intents {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for Intents {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intents_combine() {
        let intents = Intents::GUILDS | Intents::GUILD_MESSAGES;
        assert_eq!(intents.bits(), 1 | 512);
        assert!(intents.contains(Intents::GUILD_MESSAGES));
        assert!(!intents.contains(Intents::DIRECT_MESSAGES));
    }

    #[test]
    fn test_intents_serialize_as_integer() {
        let mut intents = Intents::empty();
        intents |= Intents::DIRECT_MESSAGES;
        assert_eq!(serde_json::to_string(&intents).unwrap(), "4096");
    }
}
