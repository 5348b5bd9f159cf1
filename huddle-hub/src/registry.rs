//! Session registry: who is connected, under which name and role.
//!
//! The registry owns every participant profile. It never broadcasts; callers
//! react to what `register`, `remove` and `sweep` report.

use std::collections::HashMap;
use std::time::Duration;

use huddle_proto::message::PresenceEntry;
use huddle_proto::session::{Identity, Role};
use parking_lot::RwLock;
use tokio::time::Instant;

use crate::error::HubError;

/// How a session reaches the hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// Persistent connection with an explicit disconnect signal.
    Push,
    /// Request/response polling; absence is inferred from liveness.
    Pull,
}

/// A participant profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    /// Connection identity.
    pub identity: Identity,
    /// Display name (trimmed).
    pub display_name: String,
    /// Role checked at registration.
    pub role: Role,
    /// Transport the session was registered through.
    pub transport: Transport,
    /// Last inbound activity.
    pub last_seen: Instant,
    /// Registration order, used for deterministic presence listings.
    order: u64,
}

impl Profile {
    /// Public projection of this profile.
    #[must_use]
    pub fn presence(&self) -> PresenceEntry {
        PresenceEntry {
            identity: self.identity.clone(),
            display_name: self.display_name.clone(),
            role: self.role,
        }
    }
}

/// Result of an accepted registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// The identity was not live before.
    Joined(Profile),
    /// The identity was already live; name and role were overwritten and
    /// the original transport kept.
    Updated(Profile),
}

impl Admission {
    /// The stored profile.
    #[must_use]
    pub const fn profile(&self) -> &Profile {
        match self {
            Self::Joined(p) | Self::Updated(p) => p,
        }
    }
}

#[derive(Debug, Default)]
struct Sessions {
    profiles: HashMap<Identity, Profile>,
    next_order: u64,
}

/// Thread-safe map from identity to profile.
///
/// All mutation takes the write lock; `snapshot` and lookups share the read
/// lock.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<Sessions>,
}

impl SessionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Admits `identity`, or overwrites its name and role if already live.
    ///
    /// A live session keeps the transport it was admitted with; `transport`
    /// only applies to new sessions.
    ///
    /// # Errors
    ///
    /// Returns [`HubError::InvalidRole`] if `requested_role` is not one of
    /// [`Role::ALL`] and [`HubError::EmptyName`] for a blank display name.
    /// Nothing is stored on error.
    pub fn register(
        &self,
        identity: &Identity,
        display_name: &str,
        requested_role: &str,
        transport: Transport,
        now: Instant,
    ) -> Result<Admission, HubError> {
        let role: Role = requested_role
            .parse()
            .map_err(|_| HubError::InvalidRole(requested_role.to_string()))?;
        let display_name = display_name.trim();
        if display_name.is_empty() {
            return Err(HubError::EmptyName);
        }

        let mut sessions = self.sessions.write();
        if let Some(existing) = sessions.profiles.get_mut(identity) {
            existing.display_name = display_name.to_string();
            existing.role = role;
            existing.last_seen = now;
            return Ok(Admission::Updated(existing.clone()));
        }

        let order = sessions.next_order;
        sessions.next_order += 1;
        let profile = Profile {
            identity: identity.clone(),
            display_name: display_name.to_string(),
            role,
            transport,
            last_seen: now,
            order,
        };
        sessions.profiles.insert(identity.clone(), profile.clone());
        drop(sessions);
        Ok(Admission::Joined(profile))
    }

    /// Refreshes the liveness timestamp. Returns `false` for unknown
    /// identities.
    pub fn touch(&self, identity: &Identity, now: Instant) -> bool {
        match self.sessions.write().profiles.get_mut(identity) {
            Some(profile) => {
                profile.last_seen = now;
                true
            }
            None => false,
        }
    }

    /// Deletes the session, returning the removed profile. Removing an
    /// unknown identity is a no-op returning `None`.
    pub fn remove(&self, identity: &Identity) -> Option<Profile> {
        self.sessions.write().profiles.remove(identity)
    }

    /// Returns the profile for `identity`, if live.
    pub fn get(&self, identity: &Identity) -> Option<Profile> {
        self.sessions.read().profiles.get(identity).cloned()
    }

    /// Returns `true` if `identity` is live.
    pub fn contains(&self, identity: &Identity) -> bool {
        self.sessions.read().profiles.contains_key(identity)
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.read().profiles.len()
    }

    /// Returns `true` if no session is live.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live participants in registration order.
    pub fn snapshot(&self) -> Vec<PresenceEntry> {
        let sessions = self.sessions.read();
        let mut live: Vec<&Profile> = sessions.profiles.values().collect();
        live.sort_by_key(|p| p.order);
        live.into_iter().map(Profile::presence).collect()
    }

    /// Removes polling sessions not seen within `ttl` of `now` and returns
    /// them, oldest registration first.
    ///
    /// Push sessions are never swept: their transport reports disconnects
    /// explicitly.
    pub fn sweep(&self, now: Instant, ttl: Duration) -> Vec<Profile> {
        let mut sessions = self.sessions.write();
        let expired: Vec<Identity> = sessions
            .profiles
            .values()
            .filter(|p| p.transport == Transport::Pull)
            .filter(|p| now.saturating_duration_since(p.last_seen) > ttl)
            .map(|p| p.identity.clone())
            .collect();
        let mut removed: Vec<Profile> = expired
            .iter()
            .filter_map(|id| sessions.profiles.remove(id))
            .collect();
        drop(sessions);
        removed.sort_by_key(|p| p.order);
        removed
    }
}
