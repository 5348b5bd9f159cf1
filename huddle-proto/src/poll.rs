//! Request and response bodies of the polling (HTTP) transport.
//!
//! Polling clients name themselves with the `identity` they registered
//! under; every request carrying one counts as activity for liveness.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::chat::{ChatEvent, ContentKind};
use crate::message::{ErrorCode, PresenceEntry, ServerEvent, Typer};
use crate::session::{Identity, Role};
use crate::signal::SignalKind;

/// `POST /api/register`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterRequest {
    /// Per-browser token; generated by the hub when absent.
    #[serde(default)]
    pub identity: Option<Identity>,
    /// Name shown to other participants.
    pub display_name: String,
    /// Requested role.
    pub role: String,
}

/// Response to [`RegisterRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterResponse {
    /// Identity to use on every later request.
    pub identity: Identity,
    /// Accepted display name.
    pub display_name: String,
    /// Accepted role.
    pub role: Role,
    /// History before this client's join notice.
    pub history: Vec<ChatEvent>,
    /// Pass as `since` on the next history poll.
    pub last_sequence_id: u64,
}

/// `POST /api/chat`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Sender.
    pub identity: Identity,
    /// Text or encoded attachment.
    pub body: String,
    /// Rendering hint for `body`.
    #[serde(default)]
    pub content: ContentKind,
    /// Original file name for attachments.
    #[serde(default)]
    pub file_name: Option<String>,
}

/// Response to [`ChatRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Sequence id assigned to the message.
    pub sequence_id: u64,
}

/// Query of `GET /api/history`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryQuery {
    /// Only return events with a greater sequence id.
    #[serde(default)]
    pub since: Option<u64>,
    /// Caller, refreshed for liveness if given.
    #[serde(default)]
    pub identity: Option<Identity>,
}

/// Response of `GET /api/history`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryResponse {
    /// Events in sequence order.
    pub events: Vec<ChatEvent>,
}

/// `POST /api/typing`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingRequest {
    /// Caller.
    pub identity: Identity,
    /// New flag state.
    pub is_typing: bool,
}

/// Query of `GET /api/typing` and `GET /api/events`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityQuery {
    /// Caller.
    pub identity: Identity,
}

/// Response of the typing routes: everyone typing except the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingResponse {
    /// Other active typers.
    pub typers: Vec<Typer>,
}

/// Query of `GET /api/presence`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceQuery {
    /// Caller, refreshed for liveness if given.
    #[serde(default)]
    pub identity: Option<Identity>,
}

/// Response of `GET /api/presence`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceResponse {
    /// Live participants in registration order.
    pub peers: Vec<PresenceEntry>,
}

/// `POST /api/signal`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalRequest {
    /// Sender.
    pub identity: Identity,
    /// Single recipient.
    pub target: Identity,
    /// Payload discriminator.
    pub kind: SignalKind,
    /// Opaque payload.
    pub payload: Value,
}

/// Response to a delivered [`SignalRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalResponse {
    /// Always `true`; failures are reported as errors.
    pub delivered: bool,
}

/// Response of `GET /api/events`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventsResponse {
    /// Mailbox contents, oldest first.
    pub events: Vec<ServerEvent>,
}

/// `POST /api/disconnect`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisconnectRequest {
    /// Identity to remove.
    pub identity: Identity,
}

/// Response to [`DisconnectRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisconnectResponse {
    /// `false` if the identity was not live.
    pub removed: bool,
}

/// Body of every error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Error category.
    pub code: ErrorCode,
    /// Human-readable description.
    pub reason: String,
}
