//! Gateway intents bitflags
//!
//! Intents select which event categories a shard receives after Identify.

use bitflags::bitflags;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

bitflags! {
    /// Gateway intent flags sent in the Identify payload
    ///
    /// Serialized as a plain integer, which is what the gateway expects.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct GatewayIntents: u64 {
        const GUILDS                          = 1 << 0;
        /// Privileged
        const GUILD_MEMBERS                   = 1 << 1;
        const GUILD_MODERATION                = 1 << 2;
        const GUILD_EMOJIS_AND_STICKERS       = 1 << 3;
        const GUILD_INTEGRATIONS              = 1 << 4;
        const GUILD_WEBHOOKS                  = 1 << 5;
        const GUILD_INVITES                   = 1 << 6;
        const GUILD_VOICE_STATES              = 1 << 7;
        /// Privileged
        const GUILD_PRESENCES                 = 1 << 8;
        const GUILD_MESSAGES                  = 1 << 9;
        const GUILD_MESSAGE_REACTIONS         = 1 << 10;
        const GUILD_MESSAGE_TYPING            = 1 << 11;
        const DIRECT_MESSAGES                 = 1 << 12;
        const DIRECT_MESSAGE_REACTIONS        = 1 << 13;
        const DIRECT_MESSAGE_TYPING           = 1 << 14;
        /// Privileged
        const MESSAGE_CONTENT                 = 1 << 15;
        const GUILD_SCHEDULED_EVENTS          = 1 << 16;
        const AUTO_MODERATION_CONFIGURATION   = 1 << 20;
        const AUTO_MODERATION_EXECUTION       = 1 << 21;

        /// Intents that require approval in the developer portal
        const PRIVILEGED = Self::GUILD_MEMBERS.bits()
            | Self::GUILD_PRESENCES.bits()
            | Self::MESSAGE_CONTENT.bits();
    }
}

impl GatewayIntents {
    /// Every intent that does not need portal approval
    #[must_use]
    pub fn non_privileged() -> Self {
        Self::all().difference(Self::PRIVILEGED)
    }

    /// Check whether any privileged intent is requested
    #[inline]
    pub fn is_privileged(&self) -> bool {
        self.intersects(Self::PRIVILEGED)
    }

    /// Parse from a decimal string, dropping unknown bits
    pub fn parse(s: &str) -> Result<Self, std::num::ParseIntError> {
        s.trim().parse::<u64>().map(Self::from_bits_truncate)
    }
}

impl Default for GatewayIntents {
    fn default() -> Self {
        Self::non_privileged()
    }
}

impl fmt::Display for GatewayIntents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.bits())
    }
}

impl Serialize for GatewayIntents {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(self.bits())
    }
}

impl<'de> Deserialize<'de> for GatewayIntents {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bits = u64::deserialize(deserializer)?;
        Ok(Self::from_bits_truncate(bits))
    }
}

impl From<u64> for GatewayIntents {
    fn from(bits: u64) -> Self {
        Self::from_bits_truncate(bits)
    }
}
