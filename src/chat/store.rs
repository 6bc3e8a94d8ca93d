//! Append-only message store keyed by session id.
//!
//! The relay only ever appends messages, reads one session's history, flips
//! read flags and derives per-session state; those operations are the whole
//! trait surface. Ids and timestamps are assigned here, at persistence time,
//! and history reads order by timestamp with the row id as tie-break so
//! sequential sends from one connection always come back in insertion order.

use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};
use tokio_rusqlite::Connection;

use crate::chat::config::ChatConfig;
use crate::chat::errors::ChatResult;
use crate::chat::ids::SessionId;
use crate::chat::message::{ChatMessage, ChatSession, NewChatMessage, Sender};

/// Boxed future type for message store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Message store trait.
pub trait MessageStore: Send + Sync {
    /// Persist a message, assigning its id and timestamp.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn create(&self, message: NewChatMessage) -> StoreFuture<'_, ChatResult<ChatMessage>>;

    /// Load the full history of a session, ascending by timestamp.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn session_messages(
        &self,
        session_id: SessionId,
    ) -> StoreFuture<'_, ChatResult<Vec<ChatMessage>>>;

    /// Mark all visitor-sender messages of a session as read. Idempotent.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn mark_session_read(&self, session_id: SessionId) -> StoreFuture<'_, ChatResult<()>>;

    /// Count unread visitor-sender messages across all sessions.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn unread_count(&self) -> StoreFuture<'_, ChatResult<u64>>;

    /// Enumerate all sessions with derived state, most recently active
    /// first, each carrying its full ordered history.
    ///
    /// # Errors
    /// Returns an error if storage access fails.
    fn sessions(&self) -> StoreFuture<'_, ChatResult<Vec<ChatSession>>>;
}

/// `SQLite` implementation of the message store.
pub struct SqliteMessageStore {
    conn: Connection,
    table: String,
}

impl SqliteMessageStore {
    /// Initialize the store, creating the table and indexes if needed.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened.
    pub async fn new(config: &ChatConfig) -> ChatResult<Self> {
        config.validate()?;
        let conn = Connection::open(&config.database_path).await?;
        Self::with_connection(conn, config.messages_table.clone()).await
    }

    /// Initialize an in-memory store. Used by tests and demos.
    ///
    /// # Errors
    /// Returns an error if the in-memory database cannot be created.
    pub async fn in_memory() -> ChatResult<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::with_connection(conn, "chat_messages".to_string()).await
    }

    async fn with_connection(conn: Connection, table: String) -> ChatResult<Self> {
        let table_name = table.clone();
        conn.call(move |conn| {
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {table_name} (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    session_id TEXT NOT NULL,
                    sender TEXT NOT NULL,
                    body TEXT NOT NULL,
                    ts INTEGER NOT NULL,
                    is_read INTEGER NOT NULL DEFAULT 0,
                    metadata TEXT
                );
                CREATE INDEX IF NOT EXISTS idx_{table_name}_session_ts
                    ON {table_name} (session_id, ts);
                CREATE INDEX IF NOT EXISTS idx_{table_name}_unread
                    ON {table_name} (sender, is_read);"
            ))?;
            Ok(())
        })
        .await?;

        Ok(Self { conn, table })
    }
}

/// Map one result row (id, session_id, sender, body, ts, is_read, metadata)
/// to a `ChatMessage`.
fn row_to_message(row: &rusqlite::Row<'_>) -> Result<ChatMessage, tokio_rusqlite::Error> {
    let session_raw: String = row.get(1)?;
    let sender_raw: String = row.get(2)?;
    let ts_millis: i64 = row.get(4)?;
    let metadata_raw: Option<String> = row.get(6)?;

    let session_id = SessionId::new(&session_raw)
        .map_err(|err| tokio_rusqlite::Error::Other(Box::new(err)))?;
    let sender = Sender::from_str(&sender_raw).map_err(|raw| {
        tokio_rusqlite::Error::Other(format!("unknown sender in storage: {raw}").into())
    })?;
    let timestamp = millis_to_datetime(ts_millis)?;
    let metadata = metadata_raw
        .as_deref()
        .map(serde_json::from_str)
        .transpose()
        .map_err(|err| tokio_rusqlite::Error::Other(Box::new(err)))?;

    Ok(ChatMessage {
        id: row.get(0)?,
        session_id,
        sender,
        body: row.get(3)?,
        timestamp,
        read: row.get::<_, i64>(5)? != 0,
        metadata,
    })
}

fn millis_to_datetime(millis: i64) -> Result<DateTime<Utc>, tokio_rusqlite::Error> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| tokio_rusqlite::Error::Other(format!("invalid timestamp: {millis}").into()))
}

impl MessageStore for SqliteMessageStore {
    fn create(&self, message: NewChatMessage) -> StoreFuture<'_, ChatResult<ChatMessage>> {
        Box::pin(async move {
            let table = self.table.clone();
            let timestamp = Utc::now();
            let ts_millis = timestamp.timestamp_millis();
            let metadata_json = message
                .metadata
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?;

            let session_for_insert = message.session_id.clone();
            let sender_for_insert = message.sender;
            let body_for_insert = message.body.clone();
            let read_for_insert = message.read;
            let id = self
                .conn
                .call(move |conn| {
                    conn.execute(
                        &format!(
                            "INSERT INTO {table} (session_id, sender, body, ts, is_read, metadata)
                             VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
                        ),
                        rusqlite::params![
                            session_for_insert.as_str(),
                            sender_for_insert.as_str(),
                            body_for_insert,
                            ts_millis,
                            i64::from(read_for_insert),
                            metadata_json,
                        ],
                    )?;
                    Ok(conn.last_insert_rowid())
                })
                .await?;

            Ok(ChatMessage {
                id,
                session_id: message.session_id,
                sender: message.sender,
                body: message.body,
                timestamp,
                read: message.read,
                metadata: message.metadata,
            })
        })
    }

    fn session_messages(
        &self,
        session_id: SessionId,
    ) -> StoreFuture<'_, ChatResult<Vec<ChatMessage>>> {
        Box::pin(async move {
            let table = self.table.clone();
            let messages = self
                .conn
                .call(move |conn| {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT id, session_id, sender, body, ts, is_read, metadata
                         FROM {table}
                         WHERE session_id = ?1
                         ORDER BY ts ASC, id ASC"
                    ))?;
                    let rows = stmt
                        .query_map(rusqlite::params![session_id.as_str()], |row| {
                            Ok(row_to_message(row))
                        })?
                        .collect::<Result<Vec<_>, rusqlite::Error>>()?;
                    rows.into_iter().collect::<Result<Vec<_>, _>>()
                })
                .await?;

            Ok(messages)
        })
    }

    fn mark_session_read(&self, session_id: SessionId) -> StoreFuture<'_, ChatResult<()>> {
        Box::pin(async move {
            let table = self.table.clone();
            self.conn
                .call(move |conn| {
                    conn.execute(
                        &format!(
                            "UPDATE {table} SET is_read = 1
                             WHERE session_id = ?1 AND sender = 'visitor' AND is_read = 0"
                        ),
                        rusqlite::params![session_id.as_str()],
                    )?;
                    Ok(())
                })
                .await?;

            Ok(())
        })
    }

    fn unread_count(&self) -> StoreFuture<'_, ChatResult<u64>> {
        Box::pin(async move {
            let table = self.table.clone();
            let count: i64 = self
                .conn
                .call(move |conn| {
                    let count = conn.query_row(
                        &format!(
                            "SELECT COUNT(*) FROM {table}
                             WHERE sender = 'visitor' AND is_read = 0"
                        ),
                        [],
                        |row| row.get(0),
                    )?;
                    Ok(count)
                })
                .await?;

            Ok(u64::try_from(count).unwrap_or(0))
        })
    }

    fn sessions(&self) -> StoreFuture<'_, ChatResult<Vec<ChatSession>>> {
        Box::pin(async move {
            let table = self.table.clone();
            let sessions = self
                .conn
                .call(move |conn| {
                    let mut stmt = conn.prepare(&format!(
                        "SELECT session_id,
                                SUM(CASE WHEN sender = 'visitor' AND is_read = 0
                                    THEN 1 ELSE 0 END),
                                MAX(ts)
                         FROM {table}
                         GROUP BY session_id
                         ORDER BY MAX(ts) DESC"
                    ))?;
                    let summaries = stmt
                        .query_map([], |row| {
                            let session_raw: String = row.get(0)?;
                            let unread: i64 = row.get(1)?;
                            let last_ts: i64 = row.get(2)?;
                            Ok((session_raw, unread, last_ts))
                        })?
                        .collect::<Result<Vec<_>, rusqlite::Error>>()?;

                    let mut history_stmt = conn.prepare(&format!(
                        "SELECT id, session_id, sender, body, ts, is_read, metadata
                         FROM {table}
                         WHERE session_id = ?1
                         ORDER BY ts ASC, id ASC"
                    ))?;

                    let mut sessions = Vec::with_capacity(summaries.len());
                    for (session_raw, unread, last_ts) in summaries {
                        let messages = history_stmt
                            .query_map(rusqlite::params![session_raw.as_str()], |row| {
                                Ok(row_to_message(row))
                            })?
                            .collect::<Result<Vec<_>, rusqlite::Error>>()?;
                        let messages =
                            messages.into_iter().collect::<Result<Vec<_>, _>>()?;

                        let session_id = SessionId::new(&session_raw)
                            .map_err(|err| tokio_rusqlite::Error::Other(Box::new(err)))?;
                        sessions.push(ChatSession {
                            session_id,
                            unread_count: u64::try_from(unread.max(0)).unwrap_or(0),
                            last_activity: millis_to_datetime(last_ts)?,
                            messages,
                        });
                    }
                    Ok(sessions)
                })
                .await?;

            Ok(sessions)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_message(session: &str, sender: Sender, body: &str, read: bool) -> NewChatMessage {
        NewChatMessage {
            session_id: SessionId::new(session).unwrap(),
            sender,
            body: body.to_string(),
            read,
            metadata: None,
        }
    }

    #[tokio::test]
    async fn history_preserves_insertion_order() {
        let store = SqliteMessageStore::in_memory().await.unwrap();
        for body in ["un", "deux", "trois"] {
            store
                .create(new_message("s1", Sender::Visitor, body, false))
                .await
                .unwrap();
        }

        let messages = store
            .session_messages(SessionId::new("s1").unwrap())
            .await
            .unwrap();
        let bodies: Vec<_> = messages.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, ["un", "deux", "trois"]);
        assert!(messages.windows(2).all(|w| w[0].id < w[1].id));
    }

    #[tokio::test]
    async fn unread_count_only_counts_visitor_messages() {
        let store = SqliteMessageStore::in_memory().await.unwrap();
        store
            .create(new_message("s1", Sender::Visitor, "Bonjour", false))
            .await
            .unwrap();
        store
            .create(new_message("s1", Sender::Script, "Bienvenue", true))
            .await
            .unwrap();
        store
            .create(new_message("s2", Sender::Visitor, "Allo", false))
            .await
            .unwrap();
        store
            .create(new_message("s2", Sender::Admin, "Bonjour", false))
            .await
            .unwrap();

        assert_eq!(store.unread_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn mark_read_is_idempotent_and_scoped_to_the_session() {
        let store = SqliteMessageStore::in_memory().await.unwrap();
        store
            .create(new_message("s1", Sender::Visitor, "a", false))
            .await
            .unwrap();
        store
            .create(new_message("s2", Sender::Visitor, "b", false))
            .await
            .unwrap();

        let s1 = SessionId::new("s1").unwrap();
        store.mark_session_read(s1.clone()).await.unwrap();
        store.mark_session_read(s1).await.unwrap();

        assert_eq!(store.unread_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn sessions_derive_unread_and_last_activity() {
        let store = SqliteMessageStore::in_memory().await.unwrap();
        store
            .create(new_message("s1", Sender::Visitor, "Bonjour", false))
            .await
            .unwrap();
        store
            .create(new_message("s1", Sender::Script, "Bienvenue", true))
            .await
            .unwrap();

        let sessions = store.sessions().await.unwrap();
        assert_eq!(sessions.len(), 1);
        let session = &sessions[0];
        assert_eq!(session.session_id.as_str(), "s1");
        assert_eq!(session.unread_count, 1);
        assert_eq!(session.messages.len(), 2);
        assert_eq!(session.last_activity, session.messages[1].timestamp);
    }

    #[tokio::test]
    async fn metadata_round_trips_through_storage() {
        let store = SqliteMessageStore::in_memory().await.unwrap();
        let metadata = serde_json::json!({"step": "name"});
        let mut message = new_message("s1", Sender::Script, "Quel est votre nom ?", true);
        message.metadata = Some(metadata.clone());
        store.create(message).await.unwrap();

        let messages = store
            .session_messages(SessionId::new("s1").unwrap())
            .await
            .unwrap();
        assert_eq!(messages[0].metadata, Some(metadata));
    }
}
