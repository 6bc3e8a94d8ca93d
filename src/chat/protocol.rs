//! Wire envelopes for the `/ws` channel.
//!
//! Every message on the channel is a UTF-8 JSON object with a mandatory
//! `type` field; payload fields use camelCase. Malformed envelopes are
//! reported back to the sender only, as an [`Outbound::Error`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chat::ids::SessionId;
use crate::chat::message::{ChatMessage, ChatSession, CustomerInfo, Sender};

/// Role a connection claims at identification time.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientType {
    /// Anonymous site visitor, bound to one session.
    Visitor,
    /// Back-office admin, observing all sessions.
    Admin,
}

/// Payload of an inbound `chat_message` envelope.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessagePayload {
    /// Target session.
    pub session_id: String,
    /// Claimed author role.
    pub sender: Sender,
    /// Message text.
    pub message: String,
    /// Optional initial read flag.
    #[serde(default)]
    pub read: Option<bool>,
    /// Optional structured attachment.
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

/// Payload of an inbound `live_chat_request` envelope.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveChatRequestPayload {
    /// Session asking for a live agent.
    pub session_id: String,
    /// Profile collected by the scripted flow.
    pub customer_info: CustomerInfo,
}

/// Inbound envelope, dispatched on its `type` tag.
#[derive(Clone, Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Inbound {
    /// Bind the connection's role and session.
    #[serde(rename_all = "camelCase")]
    Identify {
        /// Claimed role.
        client_type: ClientType,
        /// Session to bind, required for visitors.
        #[serde(default)]
        session_id: Option<String>,
        /// Shared secret, required for admins.
        #[serde(default)]
        admin_token: Option<String>,
    },
    /// Persist and fan out a chat message.
    ChatMessage {
        /// Message payload.
        payload: ChatMessagePayload,
    },
    /// Mark all visitor messages of a session as read.
    #[serde(rename_all = "camelCase")]
    MarkRead {
        /// Target session.
        session_id: String,
    },
    /// Fetch the full history of a session.
    #[serde(rename_all = "camelCase")]
    GetSessionMessages {
        /// Target session.
        session_id: String,
    },
    /// Enumerate all sessions with derived state. Admin only.
    AdminGetSessions,
    /// Ask for a live agent, carrying the collected profile.
    LiveChatRequest {
        /// Request payload.
        payload: LiveChatRequestPayload,
    },
}

/// Live-agent notification pushed to admin connections.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminNotification {
    /// Notification kind; currently always `live_chat_request`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Human-readable summary for the admin UI.
    pub message: String,
    /// Session asking for an agent.
    pub session_id: SessionId,
    /// Collected profile snapshot.
    pub customer_info: CustomerInfo,
    /// When the request was made.
    pub timestamp: DateTime<Utc>,
}

/// Outbound envelope.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outbound {
    /// A newly persisted message, fanned out to its session.
    ChatMessage {
        /// The persisted message.
        message: ChatMessage,
    },
    /// Full history of one session, unicast to the requester.
    SessionMessages {
        /// Messages ascending by timestamp.
        messages: Vec<ChatMessage>,
    },
    /// Global unread counter, pushed to admins after every mutation.
    UnreadCount {
        /// Count of unread visitor messages across all sessions.
        count: u64,
    },
    /// All sessions with derived state, unicast to the requesting admin.
    ChatSessions {
        /// Sessions, most recently active first.
        sessions: Vec<ChatSession>,
    },
    /// Live-agent notification, pushed to admins.
    AdminNotification {
        /// Notification body.
        notification: AdminNotification,
    },
    /// Acknowledgement of a `live_chat_request`, unicast to the requester.
    #[serde(rename_all = "camelCase")]
    LiveChatRequestAck {
        /// Whether the request was recorded.
        success: bool,
        /// Human-readable status.
        message: String,
        /// Session the acknowledgement concerns.
        session_id: SessionId,
    },
    /// Negative acknowledgement of an admin `identify` with a bad token.
    /// The connection stays open but remains unprivileged.
    AdminAuthenticated {
        /// Always `false` today; a valid identify produces no ack at all.
        authenticated: bool,
    },
    /// Connection-local error report.
    Error {
        /// What went wrong.
        message: String,
    },
}
