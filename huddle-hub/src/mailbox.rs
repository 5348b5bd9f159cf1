//! Per-identity event queues for polling clients.
//!
//! A polling client has no connection to push into, so events it cannot
//! read back from hub state (joins, departures, signals) wait in a
//! [`MailboxStore`] until its next poll drains them.

use std::collections::{HashMap, VecDeque};

use huddle_proto::message::ServerEvent;
use huddle_proto::session::Identity;
use tokio::sync::RwLock;

/// Default maximum number of queued events per identity before FIFO eviction.
pub const DEFAULT_MAILBOX_CAP: usize = 1000;

/// In-memory per-identity event queue with FIFO eviction.
///
/// Thread-safe via [`RwLock`]. Each identity has an independent queue capped
/// at a configurable maximum; when the cap is exceeded the oldest event is
/// dropped.
pub struct MailboxStore {
    queues: RwLock<HashMap<Identity, VecDeque<ServerEvent>>>,
    cap: usize,
}

impl Default for MailboxStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MailboxStore {
    /// Creates an empty store with the default per-identity cap.
    #[must_use]
    pub fn new() -> Self {
        Self::with_cap(DEFAULT_MAILBOX_CAP)
    }

    /// Creates an empty store with a custom per-identity cap (at least one).
    #[must_use]
    pub fn with_cap(cap: usize) -> Self {
        Self {
            queues: RwLock::new(HashMap::new()),
            cap: cap.max(1),
        }
    }

    /// Queues an event for `identity`, returning the new queue length.
    pub async fn enqueue(&self, identity: &Identity, event: ServerEvent) -> usize {
        let mut queues = self.queues.write().await;
        let queue = queues.entry(identity.clone()).or_default();
        queue.push_back(event);
        if queue.len() > self.cap {
            queue.pop_front();
            tracing::debug!(identity = %identity, cap = self.cap, "mailbox full, evicted oldest event");
        }
        let len = queue.len();
        drop(queues);
        len
    }

    /// Drains every queued event for `identity` in FIFO order.
    pub async fn drain(&self, identity: &Identity) -> Vec<ServerEvent> {
        let mut queues = self.queues.write().await;
        queues
            .remove(identity)
            .map(|q| q.into_iter().collect())
            .unwrap_or_default()
    }

    /// Number of events waiting for `identity`.
    pub async fn queue_len(&self, identity: &Identity) -> usize {
        let queues = self.queues.read().await;
        queues.get(identity).map_or(0, VecDeque::len)
    }
}
