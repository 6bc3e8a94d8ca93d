//! Application state shared across all request handlers.

use std::sync::Arc;

use crate::chat::config::ChatConfig;
use crate::chat::errors::ChatResult;
use crate::chat::registry::ConnectionRegistry;
use crate::chat::relay::RelayHandler;
use crate::chat::store::SqliteMessageStore;

/// Shared application state.
pub struct AppState {
    /// Registry of live connections.
    pub registry: Arc<ConnectionRegistry>,
    /// Protocol handler over the store and registry.
    pub relay: RelayHandler,
}

impl AppState {
    /// Create the application state from a validated configuration, opening
    /// the message store.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid or the database
    /// cannot be opened.
    pub async fn new(config: ChatConfig) -> ChatResult<Arc<Self>> {
        config.validate()?;
        let store = Arc::new(SqliteMessageStore::new(&config).await?);
        let registry = Arc::new(ConnectionRegistry::new());
        let relay = RelayHandler::new(store, Arc::clone(&registry), config);

        Ok(Arc::new(Self { registry, relay }))
    }
}
