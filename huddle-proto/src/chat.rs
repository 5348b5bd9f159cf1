//! Chat history records.

use serde::{Deserialize, Serialize};

use crate::session::{Identity, Timestamp};

/// Whether an event was produced by the hub or by a participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Join/leave notices generated by the hub.
    System,
    /// A message sent by a participant.
    Chat,
}

/// How the body of a chat message should be rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    /// Plain text.
    #[default]
    Text,
    /// An inline image, usually a data URL.
    Image,
    /// An attached file, usually a data URL with a `file_name`.
    File,
}

/// An immutable entry of the chat history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatEvent {
    /// Strictly increasing, never reused.
    pub sequence_id: u64,
    /// System notice or participant message.
    pub kind: EventKind,
    /// Sender identity; `None` for system notices.
    pub sender: Option<Identity>,
    /// Sender display name at the time of sending.
    pub sender_name: Option<String>,
    /// Message text or encoded attachment.
    pub body: String,
    /// Rendering hint for `body`.
    #[serde(default)]
    pub content: ContentKind,
    /// Original file name for attachments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    /// When the hub appended the event.
    pub created_at: Timestamp,
}

impl ChatEvent {
    /// Returns `true` for hub-generated notices.
    #[must_use]
    pub fn is_system(&self) -> bool {
        self.kind == EventKind::System
    }
}
