//! Live connection registry and fan-out.
//!
//! The registry holds every open real-time connection and answers, for any
//! outbound envelope, which connections should receive it. It carries no
//! business state: entries are just a role tag, an optional session binding
//! and a channel to the connection's writer task, so the same interface could
//! fan out through a different transport without touching the protocol
//! handler.
//!
//! Entries live in a `DashMap`; registration, removal and broadcast iteration
//! are therefore safe on a multi-threaded runtime without an external lock.

use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::chat::errors::ChatResult;
use crate::chat::ids::{ConnectionId, SessionId};
use crate::chat::protocol::Outbound;

/// Role tag of a live connection.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConnectionRole {
    /// Bound to one session; receives only that session's traffic.
    Visitor,
    /// Unbound; observes all sessions unconditionally.
    Admin,
}

/// One registered connection.
struct ConnectionEntry {
    role: ConnectionRole,
    session_id: Option<SessionId>,
    tx: mpsc::UnboundedSender<String>,
}

/// Registry of live connections, shared across all handlers.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, ConnectionEntry>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a freshly opened connection and return its identifier.
    ///
    /// New connections start as unbound visitors; `identify` upgrades them.
    /// There is no uniqueness constraint on session ids: a visitor with two
    /// tabs open registers two connections bound to the same session, and
    /// both receive that session's traffic.
    pub fn register(&self, tx: mpsc::UnboundedSender<String>) -> ConnectionId {
        let id = ConnectionId::new();
        self.connections.insert(
            id,
            ConnectionEntry {
                role: ConnectionRole::Visitor,
                session_id: None,
                tx,
            },
        );
        tracing::debug!(connection = %id, "connection registered");
        id
    }

    /// Bind a connection's role and session after a successful `identify`.
    pub fn identify(&self, id: ConnectionId, role: ConnectionRole, session_id: Option<SessionId>) {
        if let Some(mut entry) = self.connections.get_mut(&id) {
            entry.role = role;
            entry.session_id = session_id;
        }
    }

    /// Remove a connection on disconnect. Idempotent: removing an unknown or
    /// already removed connection is a no-op.
    pub fn unregister(&self, id: ConnectionId) {
        if self.connections.remove(&id).is_some() {
            tracing::debug!(connection = %id, "connection unregistered");
        }
    }

    /// Current role of a connection, if it is still registered.
    #[must_use]
    pub fn role(&self, id: ConnectionId) -> Option<ConnectionRole> {
        self.connections.get(&id).map(|entry| entry.role)
    }

    /// Number of live connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether no connections are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Deliver an envelope to every visitor connection bound to `session_id`
    /// and to every admin connection (admins observe all sessions).
    ///
    /// # Errors
    /// Returns an error only if the envelope cannot be serialized; send
    /// attempts to closed peers are skipped, not retried.
    pub fn broadcast_to_session(&self, session_id: &SessionId, envelope: &Outbound) -> ChatResult<()> {
        let payload = serde_json::to_string(envelope)?;
        for entry in &self.connections {
            let matches = match entry.role {
                ConnectionRole::Admin => true,
                ConnectionRole::Visitor => entry.session_id.as_ref() == Some(session_id),
            };
            if matches {
                Self::send(*entry.key(), &entry.tx, &payload);
            }
        }
        Ok(())
    }

    /// Deliver an envelope to admin connections only. Used for unread-count
    /// pushes and live-agent notifications.
    ///
    /// # Errors
    /// Returns an error only if the envelope cannot be serialized.
    pub fn broadcast_to_admins(&self, envelope: &Outbound) -> ChatResult<()> {
        let payload = serde_json::to_string(envelope)?;
        for entry in &self.connections {
            if entry.role == ConnectionRole::Admin {
                Self::send(*entry.key(), &entry.tx, &payload);
            }
        }
        Ok(())
    }

    /// Deliver an envelope to a single connection.
    ///
    /// # Errors
    /// Returns an error only if the envelope cannot be serialized.
    pub fn unicast(&self, id: ConnectionId, envelope: &Outbound) -> ChatResult<()> {
        let payload = serde_json::to_string(envelope)?;
        if let Some(entry) = self.connections.get(&id) {
            Self::send(id, &entry.tx, &payload);
        }
        Ok(())
    }

    fn send(id: ConnectionId, tx: &mpsc::UnboundedSender<String>, payload: &str) {
        if tx.send(payload.to_string()).is_err() {
            // Peer went away mid-broadcast; the disconnect handler will
            // unregister it.
            tracing::debug!(connection = %id, "skipping send to closed connection");
        }
    }
}
