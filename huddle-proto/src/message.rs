//! Messages exchanged between clients and the hub.
//!
//! [`ClientMessage`] travels client → hub, [`ServerEvent`] hub → client.
//! Both are JSON objects discriminated by a tag field (`type` and `event`
//! respectively) so browser clients can dispatch on a single key.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::chat::{ChatEvent, ContentKind};
use crate::session::{Identity, Role};
use crate::signal::SignalKind;

/// Requests a client sends over a push connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Admit this connection under a display name and role.
    ///
    /// Must be the first message on a WebSocket connection. The hub answers
    /// with [`ServerEvent::Registered`] followed by [`ServerEvent::History`].
    Register {
        /// Name shown to other participants.
        display_name: String,
        /// Requested role; validated by the hub.
        role: String,
    },

    /// Post a chat message to everyone.
    Chat {
        /// Text or encoded attachment.
        body: String,
        /// Rendering hint for `body`.
        #[serde(default)]
        content: ContentKind,
        /// Original file name for attachments.
        #[serde(default)]
        file_name: Option<String>,
    },

    /// Start or stop the typing indicator.
    Typing {
        /// `true` while composing, `false` once stopped.
        is_typing: bool,
    },

    /// Relay an opaque signaling payload to exactly one participant.
    Signal {
        /// Recipient identity.
        target: Identity,
        /// Discriminator of the payload.
        kind: SignalKind,
        /// Carried verbatim to the target.
        payload: Value,
    },

    /// Leave the hub; equivalent to closing the connection.
    Leave,
}

/// Public profile of a live participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceEntry {
    /// Participant identity.
    pub identity: Identity,
    /// Name chosen at registration.
    pub display_name: String,
    /// Role chosen at registration.
    pub role: Role,
}

/// A participant currently composing a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Typer {
    /// Participant identity, so clients can filter themselves out.
    pub identity: Identity,
    /// Name to display in the indicator.
    pub display_name: String,
}

/// Machine-readable error categories reported to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// The operation needs a live session.
    Unregistered,
    /// The requested role is not allowed.
    InvalidRole,
    /// The display name is empty.
    EmptyName,
    /// The chat body is empty or whitespace-only.
    Empty,
    /// The signal target is not live.
    TargetNotFound,
    /// A chat body or signal payload exceeds the size limit.
    PayloadTooLarge,
    /// The request could not be decoded.
    Malformed,
}

/// Events the hub delivers to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Registration accepted.
    Registered {
        /// The identity assigned to this connection.
        identity: Identity,
        /// Accepted display name (trimmed).
        display_name: String,
        /// Accepted role.
        role: Role,
    },

    /// Backfill of the chat history, sent once after registration.
    History {
        /// Retained events in sequence order.
        events: Vec<ChatEvent>,
    },

    /// A new chat or system event.
    Message(ChatEvent),

    /// Another participant joined.
    PeerJoined {
        /// The newcomer.
        identity: Identity,
        /// Newcomer's display name.
        display_name: String,
        /// Newcomer's role.
        role: Role,
    },

    /// A participant left or was swept.
    PeerLeft {
        /// The departed participant.
        identity: Identity,
        /// Their display name.
        display_name: String,
    },

    /// Full live participant list in registration order.
    Presence {
        /// Live participants.
        peers: Vec<PresenceEntry>,
    },

    /// Participants currently typing.
    Typing {
        /// Active typers, oldest flag first.
        typers: Vec<Typer>,
    },

    /// A signaling payload relayed from another participant.
    Signal {
        /// The participant that sent it.
        sender: Identity,
        /// Discriminator of the payload.
        kind: SignalKind,
        /// Payload exactly as the sender supplied it.
        payload: Value,
    },

    /// A request was rejected.
    Error {
        /// Error category.
        code: ErrorCode,
        /// Human-readable description.
        reason: String,
    },
}

impl ServerEvent {
    /// Returns `true` for events a polling client cannot read back from
    /// hub state and must therefore receive through its mailbox.
    ///
    /// Chat events are replayed from history, presence and typing are
    /// queried directly.
    #[must_use]
    pub const fn needs_mailbox(&self) -> bool {
        matches!(
            self,
            Self::PeerJoined { .. } | Self::PeerLeft { .. } | Self::Signal { .. }
        )
    }

    /// Short name of the event, for logging.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Registered { .. } => "registered",
            Self::History { .. } => "history",
            Self::Message(_) => "message",
            Self::PeerJoined { .. } => "peer_joined",
            Self::PeerLeft { .. } => "peer_left",
            Self::Presence { .. } => "presence",
            Self::Typing { .. } => "typing",
            Self::Signal { .. } => "signal",
            Self::Error { .. } => "error",
        }
    }
}
