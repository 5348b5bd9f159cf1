//! Signaling discriminators for peer-to-peer session setup.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of a relayed signaling payload.
///
/// The hub reads this tag for logging only; the payload it accompanies is
/// a contract between the two communicating clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    /// Session description offered by the initiator.
    Offer,
    /// Session description answering an offer.
    Answer,
    /// Network candidate descriptor, valid in either direction once an
    /// offer has been sent.
    Candidate,
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Offer => write!(f, "offer"),
            Self::Answer => write!(f, "answer"),
            Self::Candidate => write!(f, "candidate"),
        }
    }
}
