//! Real-time live-chat relay for the Axes Trade marketing site.
//!
//! Multiplexes anonymous visitor sessions onto a small admin pool over a
//! single WebSocket channel, with a scripted assistant collecting visitor
//! information before a human takes over.

// Discipline stricte : pas de code unsafe, et toute l'API publique documentée.
#![deny(unsafe_code)]
#![deny(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)] // unwrap() réservé aux tests
#![warn(clippy::expect_used)]
#![warn(clippy::print_stdout)]

/// Chat domain: sessions, messages, script engine, registry and relay.
pub mod chat;
/// HTTP server and the `/ws` channel.
pub mod server;
/// Entry helpers to start the relay server.
pub mod start_livechat;
