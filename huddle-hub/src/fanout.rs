//! Delivery of hub events to connected endpoints.
//!
//! Push endpoints are channels drained by a per-connection writer task.
//! Pull endpoints have no connection; the events they cannot read back from
//! hub state are parked in their mailbox until the next poll.

use std::collections::HashMap;

use huddle_proto::message::ServerEvent;
use huddle_proto::session::Identity;
use tokio::sync::{RwLock, mpsc};

use crate::mailbox::MailboxStore;

/// Sender half of a push endpoint's outbound channel.
pub type EventSender = mpsc::UnboundedSender<ServerEvent>;

/// Where events for an identity go.
#[derive(Debug, Clone)]
pub enum Endpoint {
    /// A live connection; events are written by its writer task.
    Push(EventSender),
    /// A polling client; events wait in its mailbox.
    Pull,
}

/// Outcome of a targeted delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Handed to a push endpoint.
    Delivered,
    /// Parked in a pull endpoint's mailbox.
    Queued,
    /// No endpoint is attached for the identity.
    Detached,
    /// The push endpoint's channel is closed.
    Failed,
}

/// Registry of endpoints plus the mailboxes of pull endpoints.
pub struct Fanout {
    endpoints: RwLock<HashMap<Identity, Endpoint>>,
    mailboxes: MailboxStore,
}

impl Default for Fanout {
    fn default() -> Self {
        Self::new(MailboxStore::new())
    }
}

impl Fanout {
    /// Creates a fanout with no endpoints.
    #[must_use]
    pub fn new(mailboxes: MailboxStore) -> Self {
        Self {
            endpoints: RwLock::new(HashMap::new()),
            mailboxes,
        }
    }

    /// Attaches an endpoint for `identity`, first handing it `greeting`.
    ///
    /// The greeting is written under the exclusive lock, so no broadcast can
    /// reach the endpoint ahead of it. Pull endpoints ignore the greeting;
    /// their caller returns it in the response instead. Returns `true` if an
    /// earlier endpoint was replaced.
    pub async fn attach(
        &self,
        identity: &Identity,
        endpoint: Endpoint,
        greeting: Vec<ServerEvent>,
    ) -> bool {
        let mut endpoints = self.endpoints.write().await;
        if let Endpoint::Push(sender) = &endpoint {
            for event in greeting {
                if sender.send(event).is_err() {
                    tracing::warn!(identity = %identity, "endpoint closed during greeting");
                    break;
                }
            }
        }
        endpoints.insert(identity.clone(), endpoint).is_some()
    }

    /// Detaches the endpoint for `identity` and discards its mailbox.
    ///
    /// Dropping a push endpoint's sender ends its writer task. Returns
    /// `true` if an endpoint was attached.
    pub async fn detach(&self, identity: &Identity) -> bool {
        let removed = self.endpoints.write().await.remove(identity);
        let discarded = self.mailboxes.drain(identity).await;
        if !discarded.is_empty() {
            tracing::debug!(identity = %identity, count = discarded.len(), "discarded undelivered mailbox events");
        }
        removed.is_some()
    }

    /// Delivers `event` to every endpoint except `except`.
    ///
    /// A closed push channel does not stop delivery to the others; the
    /// identities whose endpoints failed are returned so the caller can
    /// treat them as disconnected.
    pub async fn broadcast(&self, event: &ServerEvent, except: Option<&Identity>) -> Vec<Identity> {
        let endpoints = self.endpoints.read().await;
        let mut failed = Vec::new();
        for (identity, endpoint) in endpoints.iter() {
            if Some(identity) == except {
                continue;
            }
            match endpoint {
                Endpoint::Push(sender) => {
                    if sender.send(event.clone()).is_err() {
                        tracing::warn!(identity = %identity, event = event.name(), "push endpoint closed");
                        failed.push(identity.clone());
                    }
                }
                Endpoint::Pull => {
                    if event.needs_mailbox() {
                        self.mailboxes.enqueue(identity, event.clone()).await;
                    }
                }
            }
        }
        drop(endpoints);
        failed
    }

    /// Delivers `event` to exactly one identity.
    pub async fn send_to(&self, identity: &Identity, event: ServerEvent) -> Delivery {
        let endpoint = self.endpoints.read().await.get(identity).cloned();
        match endpoint {
            Some(Endpoint::Push(sender)) => {
                if sender.send(event).is_ok() {
                    Delivery::Delivered
                } else {
                    Delivery::Failed
                }
            }
            Some(Endpoint::Pull) => {
                self.mailboxes.enqueue(identity, event).await;
                Delivery::Queued
            }
            None => Delivery::Detached,
        }
    }

    /// Drains the mailbox of a pull endpoint.
    pub async fn poll(&self, identity: &Identity) -> Vec<ServerEvent> {
        self.mailboxes.drain(identity).await
    }

    /// Number of attached endpoints.
    pub async fn len(&self) -> usize {
        self.endpoints.read().await.len()
    }

    /// Returns `true` if no endpoint is attached.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Detaches every endpoint, closing all push connections.
    ///
    /// Each writer task sees its channel close and shuts its socket.
    pub async fn close_all(&self) -> usize {
        let mut endpoints = self.endpoints.write().await;
        let count = endpoints.len();
        for identity in endpoints.keys() {
            tracing::info!(identity = %identity, "closing endpoint");
        }
        endpoints.clear();
        count
    }
}
