//! Short-lived "is typing" flags with automatic expiry.
//!
//! A flag is removed by an explicit clear or once it is older than `ttl`
//! without a refresh, whichever comes first. Expiry is lazy: reads evict stale flags.

use std::collections::HashMap;
use std::time::Duration;

use huddle_proto::message::Typer;
use huddle_proto::session::Identity;
use parking_lot::Mutex;
use tokio::time::Instant;

/// Default lifetime of a typing flag without refresh.
pub const DEFAULT_TYPING_TTL: Duration = Duration::from_secs(3);

#[derive(Debug, Clone)]
struct TypingFlag {
    display_name: String,
    set_at: Instant,
}

/// Per-identity typing flags.
///
/// Reads evict, so every operation takes the same exclusive [`Mutex`].
#[derive(Debug, Default)]
pub struct TypingTracker {
    flags: Mutex<HashMap<Identity, TypingFlag>>,
}

impl TypingTracker {
    /// Creates a tracker with no flags.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets or refreshes the flag for `identity`. Returns `true` if no live
    /// flag was held before; a flag older than `ttl` counts as absent.
    pub fn mark_typing(
        &self,
        identity: &Identity,
        display_name: &str,
        now: Instant,
        ttl: Duration,
    ) -> bool {
        let mut flags = self.flags.lock();
        let was_live = flags
            .get(identity)
            .is_some_and(|flag| !is_expired(flag, now, ttl));
        flags.insert(
            identity.clone(),
            TypingFlag {
                display_name: display_name.to_string(),
                set_at: now,
            },
        );
        drop(flags);
        !was_live
    }

    /// Removes the flag for `identity`. Returns `true` if one was set.
    pub fn clear_typing(&self, identity: &Identity) -> bool {
        self.flags.lock().remove(identity).is_some()
    }

    /// Evicts flags older than `ttl`, then returns the remaining typers
    /// (oldest flag first), leaving out `exclude` if given.
    pub fn active_typers(
        &self,
        now: Instant,
        ttl: Duration,
        exclude: Option<&Identity>,
    ) -> Vec<Typer> {
        let mut flags = self.flags.lock();
        flags.retain(|_, flag| !is_expired(flag, now, ttl));

        let mut active: Vec<(&Identity, &TypingFlag)> = flags
            .iter()
            .filter(|(identity, _)| Some(*identity) != exclude)
            .collect();
        active.sort_by(|a, b| a.1.set_at.cmp(&b.1.set_at).then_with(|| a.0.cmp(b.0)));
        active
            .into_iter()
            .map(|(identity, flag)| Typer {
                identity: identity.clone(),
                display_name: flag.display_name.clone(),
            })
            .collect()
    }

    /// Evicts flags older than `ttl` and returns how many were removed.
    pub fn expire(&self, now: Instant, ttl: Duration) -> usize {
        let mut flags = self.flags.lock();
        let before = flags.len();
        flags.retain(|_, flag| !is_expired(flag, now, ttl));
        before - flags.len()
    }
}

fn is_expired(flag: &TypingFlag, now: Instant, ttl: Duration) -> bool {
    now.saturating_duration_since(flag.set_at) > ttl
}
