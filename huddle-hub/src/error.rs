//! Errors returned by hub operations.
//!
//! Every variant is recoverable by the caller: the hub reports it back to
//! the offending client and carries on.

use huddle_proto::message::ErrorCode;
use huddle_proto::session::Identity;

/// Rejections produced by the hub's operation surface.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HubError {
    /// The operation requires a live session that does not exist.
    #[error("no active session for {0}")]
    Unregistered(Identity),

    /// Registration requested a role outside the allowed set.
    #[error("invalid role {0:?} (expected A or B)")]
    InvalidRole(String),

    /// Registration with an empty display name.
    #[error("display name must not be empty")]
    EmptyName,

    /// Chat body is empty or whitespace-only.
    #[error("message body is empty")]
    Empty,

    /// Signal addressed to an identity that is not live.
    #[error("signal target {0} not found")]
    TargetNotFound(Identity),

    /// Chat body or signal payload over the configured limit.
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge {
        /// Size of the rejected payload.
        size: usize,
        /// Configured limit.
        max: usize,
    },
}

impl HubError {
    /// Wire-level category of this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Unregistered(_) => ErrorCode::Unregistered,
            Self::InvalidRole(_) => ErrorCode::InvalidRole,
            Self::EmptyName => ErrorCode::EmptyName,
            Self::Empty => ErrorCode::Empty,
            Self::TargetNotFound(_) => ErrorCode::TargetNotFound,
            Self::PayloadTooLarge { .. } => ErrorCode::PayloadTooLarge,
        }
    }
}
