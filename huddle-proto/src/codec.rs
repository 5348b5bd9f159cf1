//! Serialization for the Huddle wire protocol.
//!
//! Every frame is a single JSON document: text frames on WebSocket
//! connections and request/response bodies on the polling routes.

use crate::message::{ClientMessage, ServerEvent};

/// Error type for codec encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
    /// The frame is larger than the receiver accepts.
    #[error("frame too large: {size} bytes (max {max})")]
    TooLarge {
        /// Size of the rejected frame.
        size: usize,
        /// Configured limit.
        max: usize,
    },
}

/// Encodes a [`ServerEvent`] as a JSON string.
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the event cannot be serialized.
pub fn encode_event(event: &ServerEvent) -> Result<String, CodecError> {
    serde_json::to_string(event).map_err(|e| CodecError::Serialization(e.to_string()))
}

/// Decodes a [`ServerEvent`] from JSON text.
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the text is not a valid event.
pub fn decode_event(text: &str) -> Result<ServerEvent, CodecError> {
    serde_json::from_str(text).map_err(|e| CodecError::Serialization(e.to_string()))
}

/// Encodes a [`ClientMessage`] as a JSON string.
///
/// # Errors
///
/// Returns `CodecError::Serialization` if the message cannot be serialized.
pub fn encode_client(msg: &ClientMessage) -> Result<String, CodecError> {
    serde_json::to_string(msg).map_err(|e| CodecError::Serialization(e.to_string()))
}

/// Decodes a [`ClientMessage`] from JSON text, rejecting frames over
/// `max_len` bytes before parsing.
///
/// # Errors
///
/// Returns `CodecError::TooLarge` for oversized frames and
/// `CodecError::Serialization` for anything that is not a valid message.
pub fn decode_client(text: &str, max_len: usize) -> Result<ClientMessage, CodecError> {
    if text.len() > max_len {
        return Err(CodecError::TooLarge {
            size: text.len(),
            max: max_len,
        });
    }
    serde_json::from_str(text).map_err(|e| CodecError::Serialization(e.to_string()))
}
