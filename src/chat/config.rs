//! Configuration for the chat relay.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::chat::errors::{ChatError, ChatResult};

/// Environment variable overriding the database path.
pub const ENV_DB: &str = "AXESCHAT_DB";
/// Environment variable holding the shared admin secret.
pub const ENV_ADMIN_TOKEN: &str = "AXESCHAT_ADMIN_TOKEN";

/// Relay configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatConfig {
    /// `SQLite` database path.
    pub database_path: PathBuf,
    /// Message table name.
    pub messages_table: String,
    /// Shared secret compared against the `identify` admin token.
    ///
    /// Intentionally coarse: one secret for the whole admin pool. Callers
    /// needing per-user accountability must layer the cookie-session admin
    /// check in front of the upgrade handshake.
    pub admin_token: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("livechat.sqlite"),
            messages_table: "chat_messages".to_string(),
            admin_token: String::new(),
        }
    }
}

impl ChatConfig {
    /// Build a configuration from environment variables, falling back to
    /// defaults for anything unset.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(path) = std::env::var(ENV_DB) {
            config.database_path = PathBuf::from(path);
        }
        if let Ok(token) = std::env::var(ENV_ADMIN_TOKEN) {
            config.admin_token = token;
        }
        config
    }

    /// Validate configuration invariants.
    ///
    /// # Errors
    /// Returns an error if the admin token is empty or the table name is
    /// not a plain identifier.
    pub fn validate(&self) -> ChatResult<()> {
        if self.admin_token.trim().is_empty() {
            return Err(ChatError::InvalidConfig(format!(
                "admin token must be set (see {ENV_ADMIN_TOKEN})"
            )));
        }
        if self.messages_table.is_empty()
            || !self
                .messages_table
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(ChatError::InvalidConfig(
                "messages_table must be a plain identifier".to_string(),
            ));
        }
        Ok(())
    }
}
