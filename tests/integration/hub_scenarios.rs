//! End-to-end scenarios against the hub's operation surface.
//!
//! These drive [`Hub`] directly with in-memory push endpoints and polling
//! endpoints, without a network listener, and check the externally visible
//! guarantees: presence after removal, history ordering and capping,
//! one-to-one signal delivery and typing expiry.

// Test-specific lint overrides: integration tests use unwrap/expect freely,
// and some pedantic/nursery lints are not appropriate for test code.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::doc_markdown,
    clippy::future_not_send,
    clippy::missing_panics_doc
)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use huddle_hub::config::HubSettings;
use huddle_hub::error::HubError;
use huddle_hub::fanout::Endpoint;
use huddle_hub::hub::Hub;
use huddle_proto::chat::{ContentKind, EventKind};
use huddle_proto::message::ServerEvent;
use huddle_proto::session::{Identity, Role};
use huddle_proto::signal::SignalKind;
use serde_json::json;
use tokio::sync::mpsc;

type Rx = mpsc::UnboundedReceiver<ServerEvent>;

async fn connect(hub: &Hub, id: &str, name: &str, role: &str) -> (Identity, Rx) {
    let identity = Identity::new(id);
    let (tx, rx) = mpsc::unbounded_channel();
    hub.register(&identity, name, role, Endpoint::Push(tx))
        .await
        .expect("registration should succeed");
    (identity, rx)
}

fn drain(rx: &mut Rx) -> Vec<ServerEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

fn signals(events: &[ServerEvent]) -> Vec<&ServerEvent> {
    events
        .iter()
        .filter(|e| matches!(e, ServerEvent::Signal { .. }))
        .collect()
}

async fn chat(hub: &Hub, identity: &Identity, body: &str) {
    hub.send_chat(identity, body.to_string(), ContentKind::Text, None)
        .await
        .unwrap();
}

// =============================================================================
// Presence
// =============================================================================

#[tokio::test]
async fn removed_identity_never_reappears_in_presence() {
    let hub = Hub::default();
    for round in 0..5 {
        let (alice, _rx) = connect(&hub, "alice", "Alice", "A").await;
        let (bob, _bob_rx) = connect(&hub, &format!("bob-{round}"), "Bob", "B").await;

        assert!(hub.disconnect(&alice).await);
        let presence = hub.get_presence();
        assert!(presence.iter().all(|p| p.identity != alice));
        assert!(presence.iter().any(|p| p.identity == bob));
    }
}

#[tokio::test]
async fn polling_registration_then_disconnect_clears_presence() {
    let hub = Hub::default();
    let poller = Identity::new("poller");
    hub.register(&poller, "Pat", "B", Endpoint::Pull).await.unwrap();
    assert_eq!(hub.get_presence().len(), 1);

    assert!(hub.disconnect(&poller).await);
    assert!(hub.get_presence().is_empty());
    assert!(!hub.disconnect(&poller).await);
}

#[tokio::test]
async fn re_register_through_polling_keeps_live_socket() {
    let hub = Hub::default();
    let (alice, mut alice_rx) = connect(&hub, "alice", "Alice", "A").await;
    let (bob, mut bob_rx) = connect(&hub, "bob", "Bob", "B").await;
    drain(&mut alice_rx);
    drain(&mut bob_rx);

    let registration = hub.register(&alice, "Alicia", "A", Endpoint::Pull).await.unwrap();
    assert!(registration.updated);
    assert_eq!(registration.profile.display_name, "Alicia");

    // The push channel is still attached and still delivering.
    chat(&hub, &bob, "still there?").await;
    let events = drain(&mut alice_rx);
    assert!(events.iter().any(|e| matches!(e, ServerEvent::Message(m) if m.body == "still there?")));
    assert!(drain(&mut bob_rx)
        .iter()
        .all(|e| !matches!(e, ServerEvent::PeerLeft { .. })));

    let names: Vec<String> = hub
        .get_presence()
        .into_iter()
        .map(|p| p.display_name)
        .collect();
    assert_eq!(names, ["Alicia", "Bob"]);
    assert!(hub.get_history(None).iter().all(|e| e.body != "Alice left"));
}

// =============================================================================
// History
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_join_sees_every_chat_exactly_once() {
    for _ in 0..200 {
        let hub = Arc::new(Hub::new(HubSettings {
            history_cap: 10_000,
            ..HubSettings::default()
        }));
        let (talker, _talker_rx) = connect(&hub, "talker", "Talker", "A").await;

        let chatter = {
            let hub = Arc::clone(&hub);
            tokio::spawn(async move {
                for i in 0..100 {
                    chat(&hub, &talker, &format!("m{i}")).await;
                }
            })
        };
        let (_late, mut late_rx) = connect(&hub, "late", "Late", "B").await;
        chatter.await.unwrap();

        let mut seen: HashMap<u64, usize> = HashMap::new();
        let mut pushed = Vec::new();
        for event in drain(&mut late_rx) {
            match event {
                ServerEvent::History { events } => {
                    for e in events {
                        *seen.entry(e.sequence_id).or_default() += 1;
                    }
                }
                ServerEvent::Message(e) => {
                    pushed.push(e.sequence_id);
                    *seen.entry(e.sequence_id).or_default() += 1;
                }
                _ => {}
            }
        }

        for event in hub.get_history(None) {
            assert_eq!(
                seen.get(&event.sequence_id),
                Some(&1),
                "event {} ({}) not delivered exactly once",
                event.sequence_id,
                event.body
            );
        }
        assert!(pushed.windows(2).all(|w| w[0] < w[1]), "out of order: {pushed:?}");
    }
}

#[tokio::test]
async fn late_joiner_sees_joins_and_chat_in_order() {
    let hub = Hub::default();
    let (alice, _a) = connect(&hub, "alice", "Alice", "A").await;
    let (_bob, _b) = connect(&hub, "bob", "Bob", "B").await;
    chat(&hub, &alice, "hi").await;

    let carol = Identity::new("carol");
    let registration = hub.register(&carol, "Carol", "A", Endpoint::Pull).await.unwrap();

    let replay: Vec<(EventKind, &str)> = registration
        .history
        .iter()
        .map(|e| (e.kind, e.body.as_str()))
        .collect();
    assert_eq!(
        replay,
        [
            (EventKind::System, "Alice joined"),
            (EventKind::System, "Bob joined"),
            (EventKind::Chat, "hi"),
        ]
    );
    assert_eq!(registration.history[2].sender.as_ref(), Some(&alice));
    assert_eq!(registration.history[2].sender_name.as_deref(), Some("Alice"));
    assert_eq!(registration.last_sequence_id, 3);

    hub.disconnect(&alice).await;
    let names: Vec<String> = hub
        .get_presence()
        .into_iter()
        .map(|p| p.display_name)
        .collect();
    assert_eq!(names, ["Bob", "Carol"]);
}

#[tokio::test]
async fn history_evicts_oldest_without_renumbering() {
    let hub = Hub::new(HubSettings {
        history_cap: 50,
        ..HubSettings::default()
    });
    let (alice, _rx) = connect(&hub, "alice", "Alice", "A").await;
    // "Alice joined" is event 1; chats are 2..=51.
    for i in 0..50 {
        chat(&hub, &alice, &format!("m{i}")).await;
    }

    let history = hub.get_history(None);
    assert_eq!(history.len(), 50);
    assert_eq!(history[0].sequence_id, 2);
    assert_eq!(history[0].body, "m0");
    assert_eq!(history[49].sequence_id, 51);
    assert!(history.iter().all(|e| e.body != "Alice joined"));

    let tail = hub.get_history(Some(49));
    let ids: Vec<u64> = tail.iter().map(|e| e.sequence_id).collect();
    assert_eq!(ids, [50, 51]);
}

#[tokio::test]
async fn departure_notice_is_kept_in_history() {
    let hub = Hub::default();
    let (alice, _a) = connect(&hub, "alice", "Alice", "A").await;
    hub.disconnect(&alice).await;

    let bodies: Vec<String> = hub.get_history(None).into_iter().map(|e| e.body).collect();
    assert_eq!(bodies, ["Alice joined", "Alice left"]);
}

// =============================================================================
// Signaling
// =============================================================================

#[tokio::test]
async fn signal_reaches_target_only() {
    let hub = Hub::default();
    let (alice, mut alice_rx) = connect(&hub, "alice", "Alice", "A").await;
    let (bob, mut bob_rx) = connect(&hub, "bob", "Bob", "B").await;
    let (_carol, mut carol_rx) = connect(&hub, "carol", "Carol", "A").await;
    drain(&mut alice_rx);
    drain(&mut bob_rx);
    drain(&mut carol_rx);

    let payload = json!({ "type": "offer", "sdp": "v=0\r\no=- 1 2 IN IP4 127.0.0.1" });
    hub.send_signal(&alice, &bob, SignalKind::Offer, payload.clone())
        .await
        .unwrap();

    let to_bob = drain(&mut bob_rx);
    assert_eq!(
        signals(&to_bob),
        [&ServerEvent::Signal {
            sender: alice.clone(),
            kind: SignalKind::Offer,
            payload,
        }]
    );
    assert!(drain(&mut alice_rx).is_empty());
    assert!(drain(&mut carol_rx).is_empty());
}

#[tokio::test]
async fn signal_to_ghost_fails_without_broadcast() {
    let hub = Hub::default();
    let (alice, mut alice_rx) = connect(&hub, "alice", "Alice", "A").await;
    let (_bob, mut bob_rx) = connect(&hub, "bob", "Bob", "B").await;
    drain(&mut alice_rx);
    drain(&mut bob_rx);
    let history_before = hub.get_history(None);

    let ghost = Identity::new("ghost");
    let err = hub
        .send_signal(&alice, &ghost, SignalKind::Offer, json!({ "sdp": "x" }))
        .await
        .unwrap_err();

    assert_eq!(err, HubError::TargetNotFound(ghost));
    assert!(drain(&mut alice_rx).is_empty());
    assert!(drain(&mut bob_rx).is_empty());
    assert_eq!(hub.get_history(None), history_before);
}

#[tokio::test]
async fn signal_to_departed_peer_fails() {
    let hub = Hub::default();
    let (alice, _a) = connect(&hub, "alice", "Alice", "A").await;
    let (bob, _b) = connect(&hub, "bob", "Bob", "B").await;
    hub.disconnect(&bob).await;

    let err = hub
        .send_signal(&alice, &bob, SignalKind::Candidate, json!({ "candidate": "" }))
        .await
        .unwrap_err();
    assert!(matches!(err, HubError::TargetNotFound(_)));
}

#[tokio::test]
async fn offer_answer_exchange_between_push_and_poll() {
    let hub = Hub::default();
    let (alice, mut alice_rx) = connect(&hub, "alice", "Alice", "A").await;
    let bob = Identity::new("bob");
    hub.register(&bob, "Bob", "B", Endpoint::Pull).await.unwrap();
    drain(&mut alice_rx);

    hub.send_signal(&alice, &bob, SignalKind::Offer, json!({ "sdp": "offer" }))
        .await
        .unwrap();
    let inbox = hub.poll_events(&bob).await.unwrap();
    assert_eq!(
        inbox,
        [ServerEvent::Signal {
            sender: alice.clone(),
            kind: SignalKind::Offer,
            payload: json!({ "sdp": "offer" }),
        }]
    );

    hub.send_signal(&bob, &alice, SignalKind::Answer, json!({ "sdp": "answer" }))
        .await
        .unwrap();
    let received = drain(&mut alice_rx);
    assert_eq!(signals(&received).len(), 1);
}

// =============================================================================
// Typing
// =============================================================================

#[tokio::test(start_paused = true)]
async fn typing_flag_expires_after_ttl() {
    let hub = Hub::new(HubSettings {
        typing_ttl: Duration::from_secs(3),
        ..HubSettings::default()
    });
    let (alice, _a) = connect(&hub, "alice", "Alice", "A").await;
    let (bob, _b) = connect(&hub, "bob", "Bob", "B").await;

    hub.set_typing(&alice, true).await.unwrap();
    let typers = hub.typers(&bob).unwrap();
    assert_eq!(typers.len(), 1);
    assert_eq!(typers[0].identity, alice);
    assert_eq!(typers[0].display_name, "Alice");

    tokio::time::advance(Duration::from_millis(3100)).await;
    assert!(hub.typers(&bob).unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn refreshed_typing_flag_survives() {
    let hub = Hub::default();
    let (alice, _a) = connect(&hub, "alice", "Alice", "A").await;
    let (bob, _b) = connect(&hub, "bob", "Bob", "B").await;

    hub.set_typing(&alice, true).await.unwrap();
    tokio::time::advance(Duration::from_secs(2)).await;
    hub.set_typing(&alice, true).await.unwrap();
    tokio::time::advance(Duration::from_secs(2)).await;

    assert_eq!(hub.typers(&bob).unwrap().len(), 1);
}

#[tokio::test]
async fn typers_excludes_caller() {
    let hub = Hub::default();
    let (alice, _a) = connect(&hub, "alice", "Alice", "A").await;
    let (bob, _b) = connect(&hub, "bob", "Bob", "B").await;

    hub.set_typing(&alice, true).await.unwrap();
    let others = hub.set_typing(&bob, true).await.unwrap();
    assert_eq!(others.len(), 1);
    assert_eq!(others[0].identity, alice);
    assert_eq!(hub.typers(&alice).unwrap()[0].identity, bob);
}

// =============================================================================
// Liveness
// =============================================================================

#[tokio::test(start_paused = true)]
async fn silent_poller_is_announced_as_left() {
    let hub = Hub::new(HubSettings {
        liveness_ttl: Duration::from_secs(30),
        ..HubSettings::default()
    });
    let (_alice, mut alice_rx) = connect(&hub, "alice", "Alice", "A").await;
    let poller = Identity::new("poller");
    hub.register(&poller, "Pat", "B", Endpoint::Pull).await.unwrap();
    drain(&mut alice_rx);

    tokio::time::advance(Duration::from_secs(31)).await;
    let report = hub.maintain(tokio::time::Instant::now()).await;
    assert_eq!(report.swept, 1);

    let events = drain(&mut alice_rx);
    assert!(events.iter().any(|e| matches!(
        e,
        ServerEvent::PeerLeft { identity, .. } if *identity == poller
    )));
    assert!(events.iter().any(|e| matches!(
        e,
        ServerEvent::Presence { peers } if peers.len() == 1 && peers[0].role == Role::A
    )));
    assert!(matches!(
        hub.poll_events(&poller).await,
        Err(HubError::Unregistered(_))
    ));
}
