//! Live-chat relay: session identity, message persistence, scripted
//! conversation flow and real-time fan-out.

pub mod config;
pub mod errors;
pub mod ids;
pub mod message;
pub mod protocol;
pub mod registry;
pub mod relay;
pub mod script;
pub mod store;

pub use config::ChatConfig;
pub use errors::{ChatError, ChatResult};
pub use ids::{ConnectionId, SessionId};
pub use message::{ChatMessage, ChatSession, CustomerInfo, NewChatMessage, Sender};
pub use registry::{ConnectionRegistry, ConnectionRole};
pub use relay::RelayHandler;
pub use store::{MessageStore, SqliteMessageStore};
