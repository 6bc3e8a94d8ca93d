//! Relay protocol handler: interprets inbound envelopes, mutates the message
//! store and fans results back out through the connection registry.
//!
//! Ordering rule: persistence always precedes broadcast, so a client can
//! never observe a message it could not later re-fetch. Duplicate sends are
//! not deduplicated; each produces a distinct stored message.
//!
//! Errors are connection-local: a malformed envelope or a storage failure is
//! reported to the originating connection as an `error` envelope and never
//! degrades service to any other connection.

use std::sync::Arc;

use chrono::Utc;

use crate::chat::config::ChatConfig;
use crate::chat::errors::{ChatError, ChatResult};
use crate::chat::ids::{ConnectionId, SessionId};
use crate::chat::message::{ChatMessage, CustomerInfo, NewChatMessage, Sender};
use crate::chat::protocol::{
    AdminNotification, ChatMessagePayload, ClientType, Inbound, Outbound,
};
use crate::chat::registry::{ConnectionRegistry, ConnectionRole};
use crate::chat::script::{self, ScriptState, ScriptStep, STEP_METADATA_KEY};
use crate::chat::store::MessageStore;

/// Protocol handler shared by every connection task.
#[derive(Clone)]
pub struct RelayHandler {
    store: Arc<dyn MessageStore>,
    registry: Arc<ConnectionRegistry>,
    config: Arc<ChatConfig>,
}

impl RelayHandler {
    /// Build a handler over a store, a registry and the relay configuration.
    #[must_use]
    pub fn new(
        store: Arc<dyn MessageStore>,
        registry: Arc<ConnectionRegistry>,
        config: ChatConfig,
    ) -> Self {
        Self {
            store,
            registry,
            config: Arc::new(config),
        }
    }

    /// Parse and handle one raw frame from a connection.
    ///
    /// Never returns an error: every failure path ends in an `error`
    /// envelope to the sender (or a log line) and control returns to the
    /// event loop.
    pub async fn dispatch(&self, connection: ConnectionId, raw: &str) {
        let envelope = match serde_json::from_str::<Inbound>(raw) {
            Ok(envelope) => envelope,
            Err(err) => {
                tracing::debug!(connection = %connection, error = %err, "malformed envelope");
                self.report(connection, &format!("invalid envelope: {err}"));
                return;
            }
        };

        if let Err(err) = self.handle(connection, envelope).await {
            tracing::warn!(connection = %connection, error = %err, "envelope handling failed");
            if err.is_client_visible() {
                self.report(connection, &err.to_string());
            }
        }
    }

    /// Handle one parsed envelope.
    ///
    /// # Errors
    /// Returns validation, authorization or storage errors; the caller
    /// reports them to the originating connection only.
    pub async fn handle(&self, connection: ConnectionId, envelope: Inbound) -> ChatResult<()> {
        match envelope {
            Inbound::Identify {
                client_type,
                session_id,
                admin_token,
            } => self.handle_identify(connection, client_type, session_id, admin_token),
            Inbound::ChatMessage { payload } => {
                self.handle_chat_message(connection, payload).await
            }
            Inbound::MarkRead { session_id } => self.handle_mark_read(&session_id).await,
            Inbound::GetSessionMessages { session_id } => {
                self.handle_get_session_messages(connection, &session_id).await
            }
            Inbound::AdminGetSessions => self.handle_admin_get_sessions(connection).await,
            Inbound::LiveChatRequest { payload } => {
                let session_id = SessionId::new(&payload.session_id)?;
                self.record_live_chat_request(&session_id, &payload.customer_info)
                    .await?;
                self.registry.unicast(
                    connection,
                    &Outbound::LiveChatRequestAck {
                        success: true,
                        message: "Un conseiller a été notifié de votre demande.".to_string(),
                        session_id,
                    },
                )
            }
        }
    }

    /// Push the current global unread count to one connection. Used right
    /// after a connection opens so admin badges start out accurate.
    ///
    /// # Errors
    /// Returns an error if the count cannot be read.
    pub async fn push_unread_count(&self, connection: ConnectionId) -> ChatResult<()> {
        let count = self.store.unread_count().await?;
        self.registry
            .unicast(connection, &Outbound::UnreadCount { count })
    }

    fn handle_identify(
        &self,
        connection: ConnectionId,
        client_type: ClientType,
        session_id: Option<String>,
        admin_token: Option<String>,
    ) -> ChatResult<()> {
        match client_type {
            ClientType::Visitor => {
                let raw = session_id.ok_or_else(|| {
                    ChatError::InvalidEnvelope(
                        "identify: sessionId is required for visitors".to_string(),
                    )
                })?;
                let session_id = SessionId::new(&raw)?;
                self.registry
                    .identify(connection, ConnectionRole::Visitor, Some(session_id));
                Ok(())
            }
            ClientType::Admin => {
                let token = admin_token.unwrap_or_default();
                if !token.is_empty() && token == self.config.admin_token {
                    self.registry.identify(connection, ConnectionRole::Admin, None);
                    tracing::info!(connection = %connection, "admin connection authenticated");
                    Ok(())
                } else {
                    // Stays tagged as an unprivileged visitor until a valid
                    // identify arrives.
                    tracing::warn!(connection = %connection, "admin identify with bad token");
                    self.registry.unicast(
                        connection,
                        &Outbound::AdminAuthenticated {
                            authenticated: false,
                        },
                    )
                }
            }
        }
    }

    async fn handle_chat_message(
        &self,
        _connection: ConnectionId,
        payload: ChatMessagePayload,
    ) -> ChatResult<()> {
        let session_id = SessionId::new(&payload.session_id)?;
        let body = payload.message.trim().to_string();
        if body.is_empty() {
            return Err(ChatError::EmptyBody);
        }

        // Snapshot the history before persisting so the script engine sees
        // the state this reply is answering.
        let history = if payload.sender == Sender::Visitor {
            Some(self.store.session_messages(session_id.clone()).await?)
        } else {
            None
        };

        let read = match payload.sender {
            Sender::Script => true,
            Sender::Visitor | Sender::Admin => payload.read.unwrap_or(false),
        };
        let persisted = self
            .store
            .create(NewChatMessage {
                session_id: session_id.clone(),
                sender: payload.sender,
                body: body.clone(),
                read,
                metadata: payload.metadata,
            })
            .await?;
        self.registry
            .broadcast_to_session(&session_id, &Outbound::ChatMessage { message: persisted })?;
        self.broadcast_unread_count().await?;

        if let Some(history) = history {
            self.advance_script(&session_id, &history, &body).await?;
        }
        Ok(())
    }

    /// Feed one visitor reply to the script engine and persist its response.
    async fn advance_script(
        &self,
        session_id: &SessionId,
        history: &[ChatMessage],
        reply: &str,
    ) -> ChatResult<()> {
        let state = ScriptState::replay(history);
        if state.step.is_terminal() {
            return Ok(());
        }

        let advance = state.advance(reply);
        let Some(prompt) = advance.prompt else {
            return Ok(());
        };

        let mut metadata = serde_json::json!({ STEP_METADATA_KEY: advance.next.as_str() });
        if let Some(profile) = &advance.handoff {
            metadata["customerInfo"] = serde_json::to_value(profile)?;
        }

        let persisted = self
            .store
            .create(NewChatMessage {
                session_id: session_id.clone(),
                sender: Sender::Script,
                body: prompt,
                read: true,
                metadata: Some(metadata),
            })
            .await?;
        self.registry
            .broadcast_to_session(session_id, &Outbound::ChatMessage { message: persisted })?;

        if let Some(profile) = advance.handoff {
            self.notify_admins(session_id, &profile)?;
        }
        Ok(())
    }

    async fn handle_mark_read(&self, session_id: &str) -> ChatResult<()> {
        let session_id = SessionId::new(session_id)?;
        self.store.mark_session_read(session_id).await?;
        self.broadcast_unread_count().await
    }

    async fn handle_get_session_messages(
        &self,
        connection: ConnectionId,
        session_id: &str,
    ) -> ChatResult<()> {
        let session_id = SessionId::new(session_id)?;
        let messages = self.store.session_messages(session_id).await?;
        self.registry
            .unicast(connection, &Outbound::SessionMessages { messages })
    }

    async fn handle_admin_get_sessions(&self, connection: ConnectionId) -> ChatResult<()> {
        if self.registry.role(connection) != Some(ConnectionRole::Admin) {
            return Err(ChatError::Unauthorized("admin_get_sessions"));
        }
        let sessions = self.store.sessions().await?;
        self.registry
            .unicast(connection, &Outbound::ChatSessions { sessions })
    }

    /// Persist the waiting prompt carrying the collected profile and notify
    /// every admin. Shared between the inbound `live_chat_request` envelope
    /// and the script engine's confirmation branch.
    async fn record_live_chat_request(
        &self,
        session_id: &SessionId,
        profile: &CustomerInfo,
    ) -> ChatResult<()> {
        let metadata = serde_json::json!({
            STEP_METADATA_KEY: ScriptStep::LivechatWaiting.as_str(),
            "customerInfo": serde_json::to_value(profile)?,
        });
        let persisted = self
            .store
            .create(NewChatMessage {
                session_id: session_id.clone(),
                sender: Sender::Script,
                body: script::prompt_text(ScriptStep::LivechatWaiting, profile),
                read: true,
                metadata: Some(metadata),
            })
            .await?;
        self.registry
            .broadcast_to_session(session_id, &Outbound::ChatMessage { message: persisted })?;
        self.notify_admins(session_id, profile)
    }

    fn notify_admins(&self, session_id: &SessionId, profile: &CustomerInfo) -> ChatResult<()> {
        let who = if profile.name.is_empty() {
            "Un visiteur".to_string()
        } else {
            profile.name.clone()
        };
        self.registry.broadcast_to_admins(&Outbound::AdminNotification {
            notification: AdminNotification {
                kind: "live_chat_request".to_string(),
                message: format!("{who} souhaite parler à un conseiller en direct."),
                session_id: session_id.clone(),
                customer_info: profile.clone(),
                timestamp: Utc::now(),
            },
        })
    }

    /// Push the current unread counter to all admins. Best-effort snapshot:
    /// no transaction spans the read and the broadcast, so concurrent
    /// mutations may briefly observe a stale value until their own
    /// mutation+broadcast cycle lands.
    async fn broadcast_unread_count(&self) -> ChatResult<()> {
        let count = self.store.unread_count().await?;
        self.registry
            .broadcast_to_admins(&Outbound::UnreadCount { count })
    }

    fn report(&self, connection: ConnectionId, message: &str) {
        let envelope = Outbound::Error {
            message: message.to_string(),
        };
        if let Err(err) = self.registry.unicast(connection, &envelope) {
            tracing::warn!(connection = %connection, error = %err, "failed to report error");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::message::ChatSession;
    use crate::chat::store::{SqliteMessageStore, StoreFuture};
    use tokio::sync::mpsc;

    const ADMIN_TOKEN: &str = "secret-admin-token";

    /// Store double whose writes always fail, as if the database connection
    /// dropped mid-flight. History reads stay empty so handlers reach the
    /// failing write path.
    struct FailingStore;

    impl FailingStore {
        fn storage_error() -> ChatError {
            ChatError::TokioSqlite(tokio_rusqlite::Error::ConnectionClosed)
        }
    }

    impl MessageStore for FailingStore {
        fn create(&self, _message: NewChatMessage) -> StoreFuture<'_, ChatResult<ChatMessage>> {
            Box::pin(async { Err(Self::storage_error()) })
        }

        fn session_messages(
            &self,
            _session_id: SessionId,
        ) -> StoreFuture<'_, ChatResult<Vec<ChatMessage>>> {
            Box::pin(async { Ok(Vec::new()) })
        }

        fn mark_session_read(&self, _session_id: SessionId) -> StoreFuture<'_, ChatResult<()>> {
            Box::pin(async { Err(Self::storage_error()) })
        }

        fn unread_count(&self) -> StoreFuture<'_, ChatResult<u64>> {
            Box::pin(async { Err(Self::storage_error()) })
        }

        fn sessions(&self) -> StoreFuture<'_, ChatResult<Vec<ChatSession>>> {
            Box::pin(async { Err(Self::storage_error()) })
        }
    }

    async fn fixture() -> (RelayHandler, Arc<ConnectionRegistry>) {
        let store = Arc::new(SqliteMessageStore::in_memory().await.unwrap());
        let registry = Arc::new(ConnectionRegistry::new());
        let config = ChatConfig {
            admin_token: ADMIN_TOKEN.to_string(),
            ..ChatConfig::default()
        };
        let relay = RelayHandler::new(store, Arc::clone(&registry), config);
        (relay, registry)
    }

    fn connect(
        registry: &ConnectionRegistry,
    ) -> (ConnectionId, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (registry.register(tx), rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<String>) -> Vec<serde_json::Value> {
        let mut out = Vec::new();
        while let Ok(raw) = rx.try_recv() {
            out.push(serde_json::from_str(&raw).unwrap());
        }
        out
    }

    fn types_of(envelopes: &[serde_json::Value]) -> Vec<String> {
        envelopes
            .iter()
            .map(|v| v["type"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    async fn identify_visitor(relay: &RelayHandler, connection: ConnectionId, session: &str) {
        relay
            .handle(
                connection,
                Inbound::Identify {
                    client_type: ClientType::Visitor,
                    session_id: Some(session.to_string()),
                    admin_token: None,
                },
            )
            .await
            .unwrap();
    }

    async fn identify_admin(relay: &RelayHandler, connection: ConnectionId) {
        relay
            .handle(
                connection,
                Inbound::Identify {
                    client_type: ClientType::Admin,
                    session_id: None,
                    admin_token: Some(ADMIN_TOKEN.to_string()),
                },
            )
            .await
            .unwrap();
    }

    fn visitor_message(session: &str, body: &str) -> Inbound {
        Inbound::ChatMessage {
            payload: ChatMessagePayload {
                session_id: session.to_string(),
                sender: Sender::Visitor,
                message: body.to_string(),
                read: Some(false),
                metadata: None,
            },
        }
    }

    fn admin_message(session: &str, body: &str) -> Inbound {
        Inbound::ChatMessage {
            payload: ChatMessagePayload {
                session_id: session.to_string(),
                sender: Sender::Admin,
                message: body.to_string(),
                read: None,
                metadata: None,
            },
        }
    }

    #[tokio::test]
    async fn first_visitor_message_gets_the_welcome_prompt() {
        let (relay, registry) = fixture().await;
        let (visitor, mut rx) = connect(&registry);
        identify_visitor(&relay, visitor, "s1").await;

        relay
            .handle(visitor, visitor_message("s1", "Bonjour"))
            .await
            .unwrap();

        let envelopes = drain(&mut rx);
        assert_eq!(types_of(&envelopes), ["chat_message", "chat_message"]);
        assert_eq!(envelopes[0]["message"]["sender"], "visitor");
        assert_eq!(envelopes[1]["message"]["sender"], "script");
        assert!(envelopes[1]["message"]["message"]
            .as_str()
            .unwrap()
            .contains("bienvenue chez Axes Trade"));
        assert_eq!(envelopes[1]["message"]["metadata"]["step"], "welcome");
    }

    #[tokio::test]
    async fn admin_session_list_reflects_history_and_unread_count() {
        let (relay, registry) = fixture().await;
        let (visitor, _visitor_rx) = connect(&registry);
        identify_visitor(&relay, visitor, "s1").await;
        relay
            .handle(visitor, visitor_message("s1", "Bonjour"))
            .await
            .unwrap();

        let (admin, mut admin_rx) = connect(&registry);
        identify_admin(&relay, admin).await;
        relay.handle(admin, Inbound::AdminGetSessions).await.unwrap();

        let envelopes = drain(&mut admin_rx);
        let sessions = envelopes
            .iter()
            .find(|v| v["type"] == "chat_sessions")
            .expect("admin must receive a chat_sessions envelope");
        let session = &sessions["sessions"][0];
        assert_eq!(session["sessionId"], "s1");
        assert_eq!(session["unreadCount"], 1);
        let messages = session["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["sender"], "visitor");
        assert_eq!(messages[1]["sender"], "script");
    }

    #[tokio::test]
    async fn admin_reply_silences_the_script_for_good() {
        let (relay, registry) = fixture().await;
        let (visitor, mut visitor_rx) = connect(&registry);
        identify_visitor(&relay, visitor, "s1").await;
        relay
            .handle(visitor, visitor_message("s1", "Bonjour"))
            .await
            .unwrap();

        let (admin, _admin_rx) = connect(&registry);
        identify_admin(&relay, admin).await;
        relay
            .handle(admin, admin_message("s1", "Bonjour, comment puis-je vous aider ?"))
            .await
            .unwrap();

        drain(&mut visitor_rx);
        relay
            .handle(visitor, visitor_message("s1", "J'ai une question"))
            .await
            .unwrap();

        let envelopes = drain(&mut visitor_rx);
        let senders: Vec<_> = envelopes
            .iter()
            .filter(|v| v["type"] == "chat_message")
            .map(|v| v["message"]["sender"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(senders, ["visitor"], "no script reply after an admin joined");
    }

    #[tokio::test]
    async fn two_tabs_receive_an_admin_message_once_each() {
        let (relay, registry) = fixture().await;
        let (tab_a, mut rx_a) = connect(&registry);
        identify_visitor(&relay, tab_a, "s2").await;
        let (tab_b, mut rx_b) = connect(&registry);
        identify_visitor(&relay, tab_b, "s2").await;

        let (admin, _admin_rx) = connect(&registry);
        identify_admin(&relay, admin).await;
        relay
            .handle(admin, admin_message("s2", "Bonjour !"))
            .await
            .unwrap();

        for rx in [&mut rx_a, &mut rx_b] {
            let chat_messages: Vec<_> = drain(rx)
                .into_iter()
                .filter(|v| v["type"] == "chat_message")
                .collect();
            assert_eq!(chat_messages.len(), 1);
            assert_eq!(chat_messages[0]["message"]["message"], "Bonjour !");
        }
    }

    #[tokio::test]
    async fn empty_message_is_rejected_and_never_persisted() {
        let (relay, registry) = fixture().await;
        let (visitor, mut rx) = connect(&registry);
        identify_visitor(&relay, visitor, "s1").await;

        relay
            .dispatch(
                visitor,
                r#"{"type":"chat_message","payload":{"sessionId":"s1","sender":"visitor","message":"   "}}"#,
            )
            .await;

        let envelopes = drain(&mut rx);
        assert_eq!(types_of(&envelopes), ["error"]);

        relay
            .handle(visitor, Inbound::GetSessionMessages { session_id: "s1".to_string() })
            .await
            .unwrap();
        let envelopes = drain(&mut rx);
        assert_eq!(envelopes[0]["type"], "session_messages");
        assert_eq!(envelopes[0]["messages"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn malformed_frames_get_a_connection_local_error() {
        let (relay, registry) = fixture().await;
        let (visitor, mut rx) = connect(&registry);
        let (other, mut other_rx) = connect(&registry);

        relay.dispatch(visitor, "not json at all").await;

        assert_eq!(types_of(&drain(&mut rx)), ["error"]);
        assert!(drain(&mut other_rx).is_empty());
        assert_eq!(registry.len(), 2, "connections stay open after an error");
    }

    #[tokio::test]
    async fn bad_admin_token_leaves_connection_unprivileged() {
        let (relay, registry) = fixture().await;
        let (wannabe, mut rx) = connect(&registry);

        relay
            .handle(
                wannabe,
                Inbound::Identify {
                    client_type: ClientType::Admin,
                    session_id: None,
                    admin_token: Some("wrong".to_string()),
                },
            )
            .await
            .unwrap();

        let envelopes = drain(&mut rx);
        assert_eq!(types_of(&envelopes), ["admin_authenticated"]);
        assert_eq!(envelopes[0]["authenticated"], false);

        let err = relay
            .handle(wannabe, Inbound::AdminGetSessions)
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn completed_script_flow_notifies_admins_with_the_profile() {
        let (relay, registry) = fixture().await;
        let (visitor, mut visitor_rx) = connect(&registry);
        identify_visitor(&relay, visitor, "s1").await;
        let (admin, mut admin_rx) = connect(&registry);
        identify_admin(&relay, admin).await;

        for reply in ["Bonjour", "ok", "Jean", "ACME", "Imprimantes", "0612345678", "oui"] {
            relay
                .handle(visitor, visitor_message("s1", reply))
                .await
                .unwrap();
        }

        let visitor_envelopes = drain(&mut visitor_rx);
        let last_script = visitor_envelopes
            .iter()
            .filter(|v| v["type"] == "chat_message" && v["message"]["sender"] == "script")
            .next_back()
            .unwrap();
        assert_eq!(
            last_script["message"]["metadata"]["step"],
            "livechat_waiting"
        );
        assert_eq!(
            last_script["message"]["metadata"]["customerInfo"]["phone"],
            "0612345678"
        );

        let admin_envelopes = drain(&mut admin_rx);
        let notification = admin_envelopes
            .iter()
            .find(|v| v["type"] == "admin_notification")
            .expect("admins must be notified of the handoff");
        assert_eq!(notification["notification"]["type"], "live_chat_request");
        assert_eq!(notification["notification"]["customerInfo"]["name"], "Jean");
        assert_eq!(notification["notification"]["sessionId"], "s1");
    }

    #[tokio::test]
    async fn live_chat_request_envelope_is_acked_and_recorded() {
        let (relay, registry) = fixture().await;
        let (visitor, mut visitor_rx) = connect(&registry);
        identify_visitor(&relay, visitor, "s3").await;
        let (admin, mut admin_rx) = connect(&registry);
        identify_admin(&relay, admin).await;

        relay
            .dispatch(
                visitor,
                r#"{"type":"live_chat_request","payload":{"sessionId":"s3","customerInfo":{"name":"Jean","company":"ACME","service":"toner","phone":"0611"}}}"#,
            )
            .await;

        let visitor_envelopes = drain(&mut visitor_rx);
        let ack = visitor_envelopes
            .iter()
            .find(|v| v["type"] == "live_chat_request_ack")
            .expect("requester must receive an acknowledgement");
        assert_eq!(ack["success"], true);
        assert_eq!(ack["sessionId"], "s3");

        let admin_envelopes = drain(&mut admin_rx);
        assert!(admin_envelopes
            .iter()
            .any(|v| v["type"] == "admin_notification"));

        relay
            .handle(visitor, Inbound::GetSessionMessages { session_id: "s3".to_string() })
            .await
            .unwrap();
        let envelopes = drain(&mut visitor_rx);
        let messages = envelopes[0]["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["sender"], "script");
        assert_eq!(messages[0]["metadata"]["customerInfo"]["company"], "ACME");
    }

    #[tokio::test]
    async fn mark_read_resets_the_admin_badge_idempotently() {
        let (relay, registry) = fixture().await;
        let (visitor, _visitor_rx) = connect(&registry);
        identify_visitor(&relay, visitor, "s1").await;
        relay
            .handle(visitor, visitor_message("s1", "Bonjour"))
            .await
            .unwrap();

        let (admin, mut admin_rx) = connect(&registry);
        identify_admin(&relay, admin).await;

        for _ in 0..2 {
            relay
                .handle(admin, Inbound::MarkRead { session_id: "s1".to_string() })
                .await
                .unwrap();
        }

        let counts: Vec<_> = drain(&mut admin_rx)
            .into_iter()
            .filter(|v| v["type"] == "unread_count")
            .map(|v| v["count"].as_u64().unwrap())
            .collect();
        assert_eq!(counts, [0, 0]);
    }

    #[tokio::test]
    async fn storage_failure_is_reported_only_to_the_sender() {
        let registry = Arc::new(ConnectionRegistry::new());
        let config = ChatConfig {
            admin_token: ADMIN_TOKEN.to_string(),
            ..ChatConfig::default()
        };
        let relay = RelayHandler::new(Arc::new(FailingStore), Arc::clone(&registry), config);

        let (visitor, mut rx) = connect(&registry);
        identify_visitor(&relay, visitor, "s1").await;
        let (bystander, mut bystander_rx) = connect(&registry);
        identify_visitor(&relay, bystander, "s1").await;

        relay
            .dispatch(
                visitor,
                r#"{"type":"chat_message","payload":{"sessionId":"s1","sender":"visitor","message":"Bonjour"}}"#,
            )
            .await;

        let envelopes = drain(&mut rx);
        assert_eq!(types_of(&envelopes), ["error"]);
        assert!(envelopes[0]["message"]
            .as_str()
            .unwrap()
            .contains("tokio-rusqlite"));
        assert!(drain(&mut bystander_rx).is_empty());
        assert_eq!(registry.len(), 2, "connections survive a storage failure");
    }

    #[tokio::test]
    async fn fresh_connections_get_an_unread_count_push() {
        let (relay, registry) = fixture().await;
        let (visitor, _visitor_rx) = connect(&registry);
        identify_visitor(&relay, visitor, "s1").await;
        relay
            .handle(visitor, visitor_message("s1", "Bonjour"))
            .await
            .unwrap();

        let (fresh, mut rx) = connect(&registry);
        relay.push_unread_count(fresh).await.unwrap();

        let envelopes = drain(&mut rx);
        assert_eq!(types_of(&envelopes), ["unread_count"]);
        assert_eq!(envelopes[0]["count"], 1);
    }
}
