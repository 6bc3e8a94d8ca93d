//! Identifier types for the chat relay.
//!
//! `SessionId` is an opaque, client-minted string: the relay validates and
//! routes on it but never generates one on behalf of a connection. The
//! `generate` helper exists for browser-side callers and tests that need a
//! fresh, unguessable identifier.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::chat::errors::{ChatError, ChatResult};

/// Opaque identifier grouping all messages of one visitor conversation.
///
/// Never reused across visitors and not guessable from sequence; persisted
/// client-side so it survives page reloads.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Hard ceiling to prevent pathological payloads.
    pub const MAX_LEN: usize = 128;

    /// Build a validated `SessionId`.
    ///
    /// Rules: non-empty after trimming, bounded length, no control characters.
    ///
    /// # Errors
    /// Returns `ChatError::InvalidSessionId` if the input violates the rules.
    pub fn new(raw: impl AsRef<str>) -> ChatResult<Self> {
        let s = raw.as_ref().trim();

        if s.is_empty() {
            return Err(ChatError::InvalidSessionId("empty".to_string()));
        }
        if s.len() > Self::MAX_LEN {
            return Err(ChatError::InvalidSessionId(format!(
                "too long: got {}, max {}",
                s.len(),
                Self::MAX_LEN
            )));
        }
        if s.chars().any(char::is_control) {
            return Err(ChatError::InvalidSessionId(
                "contains control characters".to_string(),
            ));
        }

        Ok(Self(s.to_owned()))
    }

    /// Mint a fresh identifier with UUID-v4 entropy (122 random bits).
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("session_{}", Uuid::new_v4().simple()))
    }

    /// Borrow as `&str`.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume into `String`.
    #[inline]
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionId {
    type Err = ChatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

/// Identifier for one live real-time connection.
///
/// Created on connect, destroyed on disconnect; there is no reconnection
/// token linking an old connection to a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Create a new connection identifier.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Borrow the underlying UUID.
    #[inline]
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_and_whitespace_session_ids() {
        assert!(SessionId::new("").is_err());
        assert!(SessionId::new("   ").is_err());
    }

    #[test]
    fn rejects_oversized_session_ids() {
        let raw = "x".repeat(SessionId::MAX_LEN + 1);
        assert!(SessionId::new(raw).is_err());
    }

    #[test]
    fn accepts_opaque_client_ids() {
        let id = SessionId::new("session_1747316520_k3j9d0a2f").unwrap();
        assert_eq!(id.as_str(), "session_1747316520_k3j9d0a2f");
    }

    #[test]
    fn generated_ids_are_unique() {
        assert_ne!(SessionId::generate(), SessionId::generate());
    }
}
