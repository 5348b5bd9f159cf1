//! Shared protocol definitions for the Huddle wire format.

pub mod chat;
pub mod codec;
pub mod message;
pub mod poll;
pub mod session;
pub mod signal;
