//! The hub: the operation surface every transport calls into.
//!
//! [`Hub`] owns one instance of each component. Each component serialises
//! its own mutations; the hub sequences them and turns per-endpoint
//! delivery failures into disconnects.
//!
//! Appending to history and broadcasting the result happen under one
//! sequencing lock, as do taking a newcomer's replay and attaching its
//! endpoint. Every endpoint therefore sees each chat event exactly once,
//! either in its replay or as a `message`, and in `sequence_id` order.

use huddle_proto::chat::{ChatEvent, ContentKind};
use huddle_proto::message::{PresenceEntry, ServerEvent, Typer};
use huddle_proto::session::Identity;
use huddle_proto::signal::SignalKind;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::config::HubSettings;
use crate::error::HubError;
use crate::fanout::{Endpoint, Fanout};
use crate::history::{Draft, HistoryLog};
use crate::mailbox::MailboxStore;
use crate::registry::{Admission, Profile, SessionRegistry, Transport};
use crate::signal::{self, RelayOutcome, SignalEnvelope};
use crate::typing::TypingTracker;

/// What a newly registered client receives.
#[derive(Debug, Clone, PartialEq)]
pub struct Registration {
    /// The accepted public profile.
    pub profile: PresenceEntry,
    /// History as it stood before this registration's join notice.
    pub history: Vec<ChatEvent>,
    /// Id of the newest event in `history`, or 0. Polling clients pass it
    /// as `since` on their next history request.
    pub last_sequence_id: u64,
    /// `true` if the identity was already live and only its profile changed.
    pub updated: bool,
}

/// Counts reported by [`Hub::maintain`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Maintenance {
    /// Polling sessions removed for silence.
    pub swept: usize,
    /// Typing flags that expired.
    pub expired_typing: usize,
}

/// Shared hub state.
pub struct Hub {
    settings: HubSettings,
    registry: SessionRegistry,
    history: HistoryLog,
    typing: TypingTracker,
    fanout: Fanout,
    sequencer: Mutex<()>,
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(HubSettings::default())
    }
}

impl Hub {
    /// Creates an empty hub.
    #[must_use]
    pub fn new(settings: HubSettings) -> Self {
        Self {
            registry: SessionRegistry::new(),
            history: HistoryLog::with_cap(settings.history_cap),
            typing: TypingTracker::new(),
            fanout: Fanout::new(MailboxStore::with_cap(settings.mailbox_cap)),
            sequencer: Mutex::new(()),
            settings,
        }
    }

    /// Limits this hub was built with.
    #[must_use]
    pub const fn settings(&self) -> &HubSettings {
        &self.settings
    }

    /// Admits `identity` and announces it.
    ///
    /// The history replay is handed to the newcomer alone (for push
    /// endpoints as `registered` + `history` ahead of anything else on the
    /// channel). A first registration then appends and broadcasts the join
    /// notice, tells everyone else via `peer_joined`, and fans out presence.
    /// Re-registering a live identity updates its profile and only fans out
    /// presence. If that happens through a different transport, the live
    /// session keeps its endpoint and the new one is dropped.
    ///
    /// # Errors
    ///
    /// [`HubError::InvalidRole`] or [`HubError::EmptyName`]; nothing changes.
    pub async fn register(
        &self,
        identity: &Identity,
        display_name: &str,
        role: &str,
        endpoint: Endpoint,
    ) -> Result<Registration, HubError> {
        let requested = match endpoint {
            Endpoint::Push(_) => Transport::Push,
            Endpoint::Pull => Transport::Pull,
        };
        let admission =
            self.registry
                .register(identity, display_name, role, requested, Instant::now())?;
        let profile = admission.profile().presence();
        let updated = matches!(admission, Admission::Updated(_));
        let keep_endpoint = admission.profile().transport != requested;

        let mut failed = Vec::new();
        let sequence = self.sequencer.lock().await;
        let history = self.history.replay_all();
        if keep_endpoint {
            tracing::warn!(identity = %identity, transport = ?requested, "re-register through another transport, keeping live endpoint");
        } else {
            let greeting = vec![
                ServerEvent::Registered {
                    identity: profile.identity.clone(),
                    display_name: profile.display_name.clone(),
                    role: profile.role,
                },
                ServerEvent::History {
                    events: history.clone(),
                },
            ];
            self.fanout.attach(identity, endpoint, greeting).await;
        }
        if !updated {
            let notice = self
                .history
                .append(Draft::system(format!("{} joined", profile.display_name)));
            failed.extend(self.fanout.broadcast(&ServerEvent::Message(notice), None).await);
        }
        drop(sequence);

        let last_sequence_id = history.last().map_or(0, |e| e.sequence_id);
        if updated {
            tracing::info!(identity = %identity, name = %profile.display_name, role = %profile.role, "participant updated profile");
        } else {
            tracing::info!(identity = %identity, name = %profile.display_name, role = %profile.role, "participant joined");
            let joined = ServerEvent::PeerJoined {
                identity: profile.identity.clone(),
                display_name: profile.display_name.clone(),
                role: profile.role,
            };
            failed.extend(self.fanout.broadcast(&joined, Some(identity)).await);
        }
        failed.extend(self.broadcast_presence().await);
        self.settle(failed).await;

        Ok(Registration {
            profile,
            history,
            last_sequence_id,
            updated,
        })
    }

    /// Refreshes liveness for `identity`. Returns `false` if it is not live.
    pub fn touch(&self, identity: &Identity) -> bool {
        self.registry.touch(identity, Instant::now())
    }

    /// Appends a chat message and delivers it to everyone, sender included.
    ///
    /// Sending clears the sender's typing flag.
    ///
    /// # Errors
    ///
    /// [`HubError::Unregistered`], [`HubError::Empty`] (whitespace-only body;
    /// history untouched) or [`HubError::PayloadTooLarge`].
    pub async fn send_chat(
        &self,
        identity: &Identity,
        body: String,
        content: ContentKind,
        file_name: Option<String>,
    ) -> Result<ChatEvent, HubError> {
        let sender = self.live_profile(identity)?;
        if body.trim().is_empty() {
            return Err(HubError::Empty);
        }
        self.check_size(body.len())?;

        let mut failed = Vec::new();
        if self.typing.clear_typing(identity) {
            failed.extend(self.broadcast_typing(Instant::now()).await);
        }

        let (event, undelivered) = self
            .publish(
                Draft::chat(identity.clone(), sender.display_name, body)
                    .with_content(content, file_name),
            )
            .await;
        tracing::debug!(identity = %identity, sequence_id = event.sequence_id, "chat appended");
        failed.extend(undelivered);
        self.settle(failed).await;
        Ok(event)
    }

    /// Full retained history, or only events newer than `since`.
    pub fn get_history(&self, since: Option<u64>) -> Vec<ChatEvent> {
        since.map_or_else(
            || self.history.replay_all(),
            |since| self.history.replay_since(since),
        )
    }

    /// Live participants in registration order.
    pub fn get_presence(&self) -> Vec<PresenceEntry> {
        self.registry.snapshot()
    }

    /// Sets or clears the caller's typing flag and returns who else is
    /// typing.
    ///
    /// When the set of typers changes, push endpoints receive a `typing`
    /// update.
    ///
    /// # Errors
    ///
    /// [`HubError::Unregistered`].
    pub async fn set_typing(&self, identity: &Identity, is_typing: bool) -> Result<Vec<Typer>, HubError> {
        let profile = self.live_profile(identity)?;
        let now = Instant::now();
        let changed = if is_typing {
            self.typing
                .mark_typing(identity, &profile.display_name, now, self.settings.typing_ttl)
        } else {
            self.typing.clear_typing(identity)
        };
        if changed {
            let failed = self.broadcast_typing(now).await;
            self.settle(failed).await;
        }
        Ok(self
            .typing
            .active_typers(now, self.settings.typing_ttl, Some(identity)))
    }

    /// Who other than the caller is typing, without changing the caller's
    /// flag.
    ///
    /// # Errors
    ///
    /// [`HubError::Unregistered`].
    pub fn typers(&self, identity: &Identity) -> Result<Vec<Typer>, HubError> {
        self.live_profile(identity)?;
        Ok(self
            .typing
            .active_typers(Instant::now(), self.settings.typing_ttl, Some(identity)))
    }

    /// Relays a signaling payload to exactly one live participant.
    ///
    /// # Errors
    ///
    /// [`HubError::Unregistered`] for an unknown sender,
    /// [`HubError::PayloadTooLarge`], or [`HubError::TargetNotFound`] when the
    /// target is not live. Nothing is broadcast on failure.
    pub async fn send_signal(
        &self,
        identity: &Identity,
        target: &Identity,
        kind: SignalKind,
        payload: Value,
    ) -> Result<(), HubError> {
        self.live_profile(identity)?;
        self.check_size(payload.to_string().len())?;

        let envelope = SignalEnvelope {
            sender: identity.clone(),
            target: target.clone(),
            kind,
            payload,
        };
        match signal::relay(&self.registry, &self.fanout, envelope).await {
            RelayOutcome::Delivered => Ok(()),
            RelayOutcome::TargetNotFound => Err(HubError::TargetNotFound(target.clone())),
            RelayOutcome::EndpointFailed => {
                self.settle(vec![target.clone()]).await;
                Err(HubError::TargetNotFound(target.clone()))
            }
        }
    }

    /// Drains the mailbox of a polling client.
    ///
    /// # Errors
    ///
    /// [`HubError::Unregistered`].
    pub async fn poll_events(&self, identity: &Identity) -> Result<Vec<ServerEvent>, HubError> {
        self.live_profile(identity)?;
        Ok(self.fanout.poll(identity).await)
    }

    /// Removes `identity` and announces its departure.
    ///
    /// Idempotent: returns `false` and does nothing if it was not live.
    pub async fn disconnect(&self, identity: &Identity) -> bool {
        let Some(profile) = self.registry.remove(identity) else {
            self.fanout.detach(identity).await;
            return false;
        };
        let failed = self.announce_departure(profile).await;
        self.settle(failed).await;
        true
    }

    /// Sweeps silent polling clients and expires typing flags.
    ///
    /// Swept clients are announced exactly like explicit disconnects. Push
    /// endpoints get a `typing` update if any flag expired.
    pub async fn maintain(&self, now: Instant) -> Maintenance {
        let swept = self.registry.sweep(now, self.settings.liveness_ttl);
        let mut report = Maintenance {
            swept: swept.len(),
            ..Maintenance::default()
        };

        let mut failed = Vec::new();
        for profile in swept {
            tracing::info!(identity = %profile.identity, "polling client timed out");
            failed.extend(self.announce_departure(profile).await);
        }

        report.expired_typing = self.typing.expire(now, self.settings.typing_ttl);
        if report.expired_typing > 0 {
            failed.extend(self.broadcast_typing(now).await);
        }
        self.settle(failed).await;
        report
    }

    /// Closes every push connection and forgets all endpoints.
    pub async fn close_all(&self) -> usize {
        self.fanout.close_all().await
    }

    /// Appends `draft` and delivers it to every endpoint under the
    /// sequencing lock. Returns the event and the failed endpoints.
    async fn publish(&self, draft: Draft) -> (ChatEvent, Vec<Identity>) {
        let _sequence = self.sequencer.lock().await;
        let event = self.history.append(draft);
        let failed = self
            .fanout
            .broadcast(&ServerEvent::Message(event.clone()), None)
            .await;
        (event, failed)
    }

    /// Broadcasts the current presence list. Returns failed endpoints.
    async fn broadcast_presence(&self) -> Vec<Identity> {
        let event = ServerEvent::Presence {
            peers: self.registry.snapshot(),
        };
        self.fanout.broadcast(&event, None).await
    }

    /// Broadcasts every active typer. Returns failed endpoints.
    async fn broadcast_typing(&self, now: Instant) -> Vec<Identity> {
        let event = ServerEvent::Typing {
            typers: self.typing.active_typers(now, self.settings.typing_ttl, None),
        };
        self.fanout.broadcast(&event, None).await
    }

    /// Announces a session already removed from the registry. Returns the
    /// endpoints that failed while announcing.
    async fn announce_departure(&self, profile: Profile) -> Vec<Identity> {
        let identity = &profile.identity;
        let was_typing = self.typing.clear_typing(identity);
        self.fanout.detach(identity).await;
        tracing::info!(identity = %identity, name = %profile.display_name, "participant left");

        let (_, mut failed) = self
            .publish(Draft::system(format!("{} left", profile.display_name)))
            .await;
        let left = ServerEvent::PeerLeft {
            identity: identity.clone(),
            display_name: profile.display_name.clone(),
        };
        failed.extend(self.fanout.broadcast(&left, None).await);
        failed.extend(self.broadcast_presence().await);
        if was_typing {
            failed.extend(self.broadcast_typing(Instant::now()).await);
        }
        failed
    }

    /// Disconnects every identity whose endpoint failed, including any that
    /// fail while their departures are announced.
    async fn settle(&self, mut failed: Vec<Identity>) {
        while let Some(identity) = failed.pop() {
            let Some(profile) = self.registry.remove(&identity) else {
                self.fanout.detach(&identity).await;
                continue;
            };
            tracing::warn!(identity = %identity, "delivery failed, treating as disconnect");
            failed.extend(self.announce_departure(profile).await);
        }
    }

    fn live_profile(&self, identity: &Identity) -> Result<Profile, HubError> {
        if !self.registry.touch(identity, Instant::now()) {
            return Err(HubError::Unregistered(identity.clone()));
        }
        self.registry
            .get(identity)
            .ok_or_else(|| HubError::Unregistered(identity.clone()))
    }

    const fn check_size(&self, size: usize) -> Result<(), HubError> {
        if size > self.settings.max_payload_size {
            return Err(HubError::PayloadTooLarge {
                size,
                max: self.settings.max_payload_size,
            });
        }
        Ok(())
    }
}
