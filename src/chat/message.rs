//! Chat message data model.

use core::fmt;
use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chat::ids::SessionId;

/// Author role of a persisted chat message.
///
/// This is a closed set: adding a sender kind is a breaking protocol change.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    /// Anonymous site visitor.
    Visitor,
    /// Back-office admin (a human agent).
    Admin,
    /// Scripted assistant prompt.
    Script,
}

impl Sender {
    /// Stable string form for storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Visitor => "visitor",
            Self::Admin => "admin",
            Self::Script => "script",
        }
    }
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Sender {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "visitor" => Ok(Self::Visitor),
            "admin" => Ok(Self::Admin),
            "script" => Ok(Self::Script),
            _ => Err(value.to_string()),
        }
    }
}

/// A persisted chat message.
///
/// `id` and `timestamp` are assigned at persistence time; messages within a
/// session are strictly ordered by timestamp (insertion order as tie-break).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Monotonic identifier assigned by the store.
    pub id: i64,
    /// Session this message belongs to.
    pub session_id: SessionId,
    /// Author role.
    pub sender: Sender,
    /// Message text; never empty after trimming.
    #[serde(rename = "message")]
    pub body: String,
    /// Persistence timestamp.
    pub timestamp: DateTime<Utc>,
    /// Whether an admin has observed this message. Only meaningful for
    /// visitor-sender messages.
    pub read: bool,
    /// Optional structured attachment, opaque to routing. The script engine
    /// stores its current step here, and a live-agent handoff carries the
    /// collected profile snapshot.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Insert form of a chat message, before the store assigns id and timestamp.
#[derive(Clone, Debug)]
pub struct NewChatMessage {
    /// Session the message belongs to.
    pub session_id: SessionId,
    /// Author role.
    pub sender: Sender,
    /// Message text, already trimmed and non-empty.
    pub body: String,
    /// Initial read flag. Script prompts are persisted already read so they
    /// never count against the admin unread badge.
    pub read: bool,
    /// Optional structured attachment.
    pub metadata: Option<serde_json::Value>,
}

/// Derived view of one visitor conversation, computed from the message log.
///
/// A session is active from the first persisted message on; it never formally
/// closes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    /// Session identifier.
    pub session_id: SessionId,
    /// Count of unread visitor-authored messages.
    pub unread_count: u64,
    /// Timestamp of the most recent message.
    pub last_activity: DateTime<Utc>,
    /// Full message history, ascending by timestamp.
    pub messages: Vec<ChatMessage>,
}

/// Profile fields collected by the script engine before a live-agent handoff.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerInfo {
    /// Visitor name.
    #[serde(default)]
    pub name: String,
    /// Visitor company.
    #[serde(default)]
    pub company: String,
    /// Service or product of interest.
    #[serde(default)]
    pub service: String,
    /// Callback phone number.
    #[serde(default)]
    pub phone: String,
}
