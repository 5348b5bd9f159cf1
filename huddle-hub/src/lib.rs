//! Huddle hub library.
//!
//! Exposes the hub for use in tests and embedding. The hub tracks who is
//! connected, keeps a short chat history, aggregates typing indicators,
//! broadcasts chat and presence events, and relays signaling payloads
//! between two participants so they can set up a direct media session.
//! It serves browser clients over WebSocket (push) and plain JSON HTTP
//! (polling).

pub mod config;
pub mod error;
pub mod fanout;
pub mod history;
pub mod http;
pub mod hub;
pub mod mailbox;
pub mod registry;
pub mod server;
pub mod signal;
pub mod typing;
pub mod ws;
