//! One-to-one relay of signaling payloads.
//!
//! The relay forwards an envelope to exactly one live target and never falls
//! back to broadcasting. It keeps no state: the offer/answer/candidate
//! exchange is tracked by the two clients, and the relay only has to
//! preserve per-sender order, which the sender's single worker already does.

use huddle_proto::message::ServerEvent;
use huddle_proto::session::Identity;
use huddle_proto::signal::SignalKind;
use serde_json::Value;

use crate::fanout::{Delivery, Fanout};
use crate::registry::SessionRegistry;

/// A signaling message in transit. Never stored.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalEnvelope {
    /// Registered identity of the sender (never taken from the payload).
    pub sender: Identity,
    /// The single recipient.
    pub target: Identity,
    /// Payload discriminator.
    pub kind: SignalKind,
    /// Opaque payload.
    pub payload: Value,
}

/// Outcome of a relay attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Handed to the target's endpoint (or parked in its mailbox).
    Delivered,
    /// The target is not live; nothing was sent.
    TargetNotFound,
    /// The target is registered but its connection is gone.
    EndpointFailed,
}

/// Forwards `envelope` to its target if the target is live.
pub async fn relay(
    registry: &SessionRegistry,
    fanout: &Fanout,
    envelope: SignalEnvelope,
) -> RelayOutcome {
    if !registry.contains(&envelope.target) {
        tracing::debug!(
            sender = %envelope.sender,
            to = %envelope.target,
            kind = %envelope.kind,
            "signal target not registered"
        );
        return RelayOutcome::TargetNotFound;
    }

    let target = envelope.target.clone();
    let kind = envelope.kind;
    let event = ServerEvent::Signal {
        sender: envelope.sender,
        kind: envelope.kind,
        payload: envelope.payload,
    };

    match fanout.send_to(&target, event).await {
        Delivery::Delivered | Delivery::Queued => {
            tracing::debug!(to = %target, kind = %kind, "signal relayed");
            RelayOutcome::Delivered
        }
        Delivery::Detached => RelayOutcome::TargetNotFound,
        Delivery::Failed => {
            tracing::warn!(to = %target, kind = %kind, "signal target endpoint closed");
            RelayOutcome::EndpointFailed
        }
    }
}
