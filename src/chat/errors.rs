//! Error types for the chat relay subsystem.

use thiserror::Error;

/// Chat relay error type.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Invalid configuration or unsupported values.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Inbound envelope could not be parsed or is missing required fields.
    #[error("invalid envelope: {0}")]
    InvalidEnvelope(String),
    /// Message body is empty after trimming.
    #[error("message body must not be empty")]
    EmptyBody,
    /// Session identifier failed validation.
    #[error("invalid session id: {0}")]
    InvalidSessionId(String),
    /// Operation requires an authenticated admin connection.
    #[error("admin privileges required for {0}")]
    Unauthorized(&'static str),
    /// `SQLite` storage error (sync).
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// `SQLite` storage error (async).
    #[error("tokio-rusqlite error: {0}")]
    TokioSqlite(#[from] tokio_rusqlite::Error),
    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ChatError {
    /// Whether this error should be reported back to the originating
    /// connection as an `error` envelope. Everything is connection-local;
    /// nothing in the relay is fatal to the process.
    #[must_use]
    pub const fn is_client_visible(&self) -> bool {
        !matches!(self, Self::Io(_))
    }
}

/// Convenience result alias for chat relay operations.
pub type ChatResult<T> = Result<T, ChatError>;
