//! Bounded chat history replayed to newcomers and polling clients.
//!
//! The [`HistoryLog`] keeps the most recent events in sequence order. When
//! the cap is exceeded the oldest event is evicted (FIFO); surviving events
//! keep their sequence ids.

use std::collections::VecDeque;

use huddle_proto::chat::{ChatEvent, ContentKind, EventKind};
use huddle_proto::session::{Identity, Timestamp};
use parking_lot::RwLock;

/// Default number of retained events.
pub const DEFAULT_HISTORY_CAP: usize = 50;

/// An event about to be appended; the log assigns id and timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Draft {
    kind: EventKind,
    sender: Option<Identity>,
    sender_name: Option<String>,
    body: String,
    content: ContentKind,
    file_name: Option<String>,
}

impl Draft {
    /// A hub-generated notice.
    #[must_use]
    pub fn system(body: impl Into<String>) -> Self {
        Self {
            kind: EventKind::System,
            sender: None,
            sender_name: None,
            body: body.into(),
            content: ContentKind::Text,
            file_name: None,
        }
    }

    /// A participant message.
    #[must_use]
    pub fn chat(sender: Identity, sender_name: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Chat,
            sender: Some(sender),
            sender_name: Some(sender_name.into()),
            body: body.into(),
            content: ContentKind::Text,
            file_name: None,
        }
    }

    /// Marks the body as an attachment.
    #[must_use]
    pub fn with_content(mut self, content: ContentKind, file_name: Option<String>) -> Self {
        self.content = content;
        self.file_name = file_name;
        self
    }
}

#[derive(Debug)]
struct Log {
    events: VecDeque<ChatEvent>,
    next_id: u64,
}

/// Insertion-ordered, capped event log.
///
/// Thread-safe via [`RwLock`]: `append` is exclusive, replays share the read
/// lock.
#[derive(Debug)]
pub struct HistoryLog {
    log: RwLock<Log>,
    cap: usize,
}

impl Default for HistoryLog {
    fn default() -> Self {
        Self::new()
    }
}

impl HistoryLog {
    /// Creates an empty log retaining [`DEFAULT_HISTORY_CAP`] events.
    #[must_use]
    pub fn new() -> Self {
        Self::with_cap(DEFAULT_HISTORY_CAP)
    }

    /// Creates an empty log retaining at most `cap` events (at least one).
    #[must_use]
    pub fn with_cap(cap: usize) -> Self {
        let cap = cap.max(1);
        Self {
            log: RwLock::new(Log {
                events: VecDeque::with_capacity(cap + 1),
                next_id: 1,
            }),
            cap,
        }
    }

    /// Maximum number of retained events.
    #[must_use]
    pub const fn cap(&self) -> usize {
        self.cap
    }

    /// Appends an event under the next sequence id and returns it, evicting
    /// the oldest retained event if the cap is exceeded.
    pub fn append(&self, draft: Draft) -> ChatEvent {
        let mut log = self.log.write();
        let event = ChatEvent {
            sequence_id: log.next_id,
            kind: draft.kind,
            sender: draft.sender,
            sender_name: draft.sender_name,
            body: draft.body,
            content: draft.content,
            file_name: draft.file_name,
            created_at: Timestamp::now(),
        };
        log.next_id += 1;
        log.events.push_back(event.clone());
        while log.events.len() > self.cap {
            log.events.pop_front();
        }
        drop(log);
        event
    }

    /// All retained events in sequence order.
    pub fn replay_all(&self) -> Vec<ChatEvent> {
        self.log.read().events.iter().cloned().collect()
    }

    /// Retained events with `sequence_id > since`, in sequence order.
    ///
    /// Retained ids are contiguous, so the starting offset is computed
    /// directly instead of scanning.
    pub fn replay_since(&self, since: u64) -> Vec<ChatEvent> {
        let log = self.log.read();
        let Some(first) = log.events.front().map(|e| e.sequence_id) else {
            return Vec::new();
        };
        let skip = if since < first {
            0
        } else {
            usize::try_from(since - first + 1).unwrap_or(usize::MAX)
        };
        log.events.iter().skip(skip).cloned().collect()
    }

    /// Id of the newest event ever appended, or 0 if none.
    pub fn last_sequence_id(&self) -> u64 {
        self.log.read().next_id - 1
    }

    /// Number of retained events.
    pub fn len(&self) -> usize {
        self.log.read().events.len()
    }

    /// Returns `true` if nothing is retained.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
