//! Integration tests for the push transport.
//!
//! Starts the hub in-process on an ephemeral port and drives it with real
//! WebSocket clients speaking the JSON protocol.

// Test-specific lint overrides: integration tests use unwrap/expect freely,
// and some pedantic/nursery lints are not appropriate for test code.
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::doc_markdown,
    clippy::future_not_send,
    clippy::missing_panics_doc
)]

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use huddle_proto::chat::{ContentKind, EventKind};
use huddle_proto::codec;
use huddle_proto::message::{ClientMessage, ErrorCode, ServerEvent};
use huddle_proto::session::{Identity, Role};
use huddle_proto::signal::SignalKind;
use serde_json::json;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Start the hub in-process and return a ws:// URL.
async fn start_hub() -> (String, tokio::task::JoinHandle<()>) {
    let (addr, handle) = huddle_hub::server::start_server("127.0.0.1:0")
        .await
        .expect("failed to start hub");
    (format!("ws://{addr}/ws"), handle)
}

async fn open(url: &str) -> Ws {
    let (ws, _) = tokio_tungstenite::connect_async(url)
        .await
        .expect("failed to connect");
    ws
}

async fn send(ws: &mut Ws, msg: &ClientMessage) {
    let text = codec::encode_client(msg).unwrap();
    ws.send(Message::Text(text.into())).await.unwrap();
}

/// Reads the next protocol event, skipping control frames.
async fn next_event(ws: &mut Ws) -> ServerEvent {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("recv timed out")
            .expect("stream ended")
            .expect("websocket error");
        if let Message::Text(text) = frame {
            return codec::decode_event(text.as_str()).unwrap();
        }
    }
}

/// Reads events until one matches `pred`.
async fn wait_for(ws: &mut Ws, pred: impl Fn(&ServerEvent) -> bool) -> ServerEvent {
    loop {
        let event = next_event(ws).await;
        if pred(&event) {
            return event;
        }
    }
}

/// Connects, registers and consumes the greeting. Returns the assigned
/// identity.
async fn join(url: &str, name: &str, role: &str) -> (Ws, Identity) {
    let mut ws = open(url).await;
    send(
        &mut ws,
        &ClientMessage::Register {
            display_name: name.to_string(),
            role: role.to_string(),
        },
    )
    .await;
    let ServerEvent::Registered { identity, .. } = next_event(&mut ws).await else {
        panic!("expected registered");
    };
    assert!(matches!(next_event(&mut ws).await, ServerEvent::History { .. }));
    (ws, identity)
}

fn chat(body: &str) -> ClientMessage {
    ClientMessage::Chat {
        body: body.to_string(),
        content: ContentKind::Text,
        file_name: None,
    }
}

#[tokio::test]
async fn register_receives_identity_then_history() {
    let (url, _handle) = start_hub().await;
    let mut ws = open(&url).await;
    send(
        &mut ws,
        &ClientMessage::Register {
            display_name: "  Alice ".to_string(),
            role: "a".to_string(),
        },
    )
    .await;

    match next_event(&mut ws).await {
        ServerEvent::Registered {
            identity,
            display_name,
            role,
        } => {
            assert!(!identity.is_blank());
            assert_eq!(display_name, "Alice");
            assert_eq!(role, Role::A);
        }
        other => panic!("expected registered, got {other:?}"),
    }
    assert_eq!(
        next_event(&mut ws).await,
        ServerEvent::History { events: Vec::new() }
    );

    let ServerEvent::Message(notice) = next_event(&mut ws).await else {
        panic!("expected own join notice");
    };
    assert_eq!(notice.kind, EventKind::System);
    assert_eq!(notice.body, "Alice joined");
}

#[tokio::test]
async fn invalid_role_is_rejected_and_retry_succeeds() {
    let (url, _handle) = start_hub().await;
    let mut ws = open(&url).await;
    send(
        &mut ws,
        &ClientMessage::Register {
            display_name: "Alice".to_string(),
            role: "C".to_string(),
        },
    )
    .await;
    assert!(matches!(
        next_event(&mut ws).await,
        ServerEvent::Error {
            code: ErrorCode::InvalidRole,
            ..
        }
    ));

    send(
        &mut ws,
        &ClientMessage::Register {
            display_name: "Alice".to_string(),
            role: "A".to_string(),
        },
    )
    .await;
    assert!(matches!(
        next_event(&mut ws).await,
        ServerEvent::Registered { role: Role::A, .. }
    ));
}

#[tokio::test]
async fn requests_before_register_are_refused() {
    let (url, _handle) = start_hub().await;
    let mut ws = open(&url).await;
    send(&mut ws, &chat("too early")).await;
    assert!(matches!(
        next_event(&mut ws).await,
        ServerEvent::Error {
            code: ErrorCode::Unregistered,
            ..
        }
    ));
}

#[tokio::test]
async fn chat_reaches_sender_and_peer() {
    let (url, _handle) = start_hub().await;
    let (mut alice, alice_id) = join(&url, "Alice", "A").await;
    let (mut bob, _) = join(&url, "Bob", "B").await;

    send(&mut alice, &chat("hi")).await;

    for ws in [&mut alice, &mut bob] {
        let ServerEvent::Message(event) = wait_for(ws, |e| {
            matches!(e, ServerEvent::Message(m) if m.kind == EventKind::Chat)
        })
        .await
        else {
            unreachable!();
        };
        assert_eq!(event.body, "hi");
        assert_eq!(event.sender.as_ref(), Some(&alice_id));
        assert_eq!(event.sender_name.as_deref(), Some("Alice"));
    }
}

#[tokio::test]
async fn late_joiner_receives_backfill() {
    let (url, _handle) = start_hub().await;
    let (mut alice, _) = join(&url, "Alice", "A").await;
    let (_bob, _) = join(&url, "Bob", "B").await;
    send(&mut alice, &chat("hi")).await;
    wait_for(&mut alice, |e| matches!(e, ServerEvent::Message(m) if m.body == "hi")).await;

    let mut carol = open(&url).await;
    send(
        &mut carol,
        &ClientMessage::Register {
            display_name: "Carol".to_string(),
            role: "A".to_string(),
        },
    )
    .await;
    assert!(matches!(next_event(&mut carol).await, ServerEvent::Registered { .. }));
    let ServerEvent::History { events } = next_event(&mut carol).await else {
        panic!("expected history");
    };
    let bodies: Vec<&str> = events.iter().map(|e| e.body.as_str()).collect();
    assert_eq!(bodies, ["Alice joined", "Bob joined", "hi"]);
}

#[tokio::test]
async fn signal_is_relayed_to_target() {
    let (url, _handle) = start_hub().await;
    let (mut alice, alice_id) = join(&url, "Alice", "A").await;
    let (mut bob, bob_id) = join(&url, "Bob", "B").await;

    let payload = json!({ "type": "offer", "sdp": "v=0" });
    send(
        &mut alice,
        &ClientMessage::Signal {
            target: bob_id,
            kind: SignalKind::Offer,
            payload: payload.clone(),
        },
    )
    .await;

    let event = wait_for(&mut bob, |e| matches!(e, ServerEvent::Signal { .. })).await;
    assert_eq!(
        event,
        ServerEvent::Signal {
            sender: alice_id,
            kind: SignalKind::Offer,
            payload,
        }
    );
}

#[tokio::test]
async fn signal_to_unknown_target_reports_error() {
    let (url, _handle) = start_hub().await;
    let (mut alice, _) = join(&url, "Alice", "A").await;

    send(
        &mut alice,
        &ClientMessage::Signal {
            target: Identity::new("ghost"),
            kind: SignalKind::Candidate,
            payload: json!({ "candidate": "" }),
        },
    )
    .await;

    let event = wait_for(&mut alice, |e| matches!(e, ServerEvent::Error { .. })).await;
    assert!(matches!(
        event,
        ServerEvent::Error {
            code: ErrorCode::TargetNotFound,
            ..
        }
    ));
}

#[tokio::test]
async fn malformed_frame_keeps_connection_open() {
    let (url, _handle) = start_hub().await;
    let (mut alice, _) = join(&url, "Alice", "A").await;

    alice.send(Message::Text("not json".into())).await.unwrap();
    wait_for(&mut alice, |e| {
        matches!(
            e,
            ServerEvent::Error {
                code: ErrorCode::Malformed,
                ..
            }
        )
    })
    .await;

    send(&mut alice, &chat("still here")).await;
    wait_for(&mut alice, |e| matches!(e, ServerEvent::Message(m) if m.body == "still here")).await;
}

#[tokio::test]
async fn typing_is_pushed_to_peers() {
    let (url, _handle) = start_hub().await;
    let (mut alice, alice_id) = join(&url, "Alice", "A").await;
    let (mut bob, _) = join(&url, "Bob", "B").await;

    send(&mut alice, &ClientMessage::Typing { is_typing: true }).await;
    let event = wait_for(&mut bob, |e| {
        matches!(e, ServerEvent::Typing { typers } if !typers.is_empty())
    })
    .await;
    let ServerEvent::Typing { typers } = event else {
        unreachable!();
    };
    assert_eq!(typers[0].identity, alice_id);
}

#[tokio::test]
async fn closing_connection_announces_departure() {
    let (url, _handle) = start_hub().await;
    let (mut alice, alice_id) = join(&url, "Alice", "A").await;
    let (mut bob, _) = join(&url, "Bob", "B").await;
    wait_for(&mut alice, |e| matches!(e, ServerEvent::PeerJoined { .. })).await;

    alice.close(None).await.unwrap();

    let left = wait_for(&mut bob, |e| matches!(e, ServerEvent::PeerLeft { .. })).await;
    assert_eq!(
        left,
        ServerEvent::PeerLeft {
            identity: alice_id,
            display_name: "Alice".to_string(),
        }
    );
    let presence = wait_for(&mut bob, |e| matches!(e, ServerEvent::Presence { .. })).await;
    let ServerEvent::Presence { peers } = presence else {
        unreachable!();
    };
    assert_eq!(peers.len(), 1);
    assert_eq!(peers[0].display_name, "Bob");
}

#[tokio::test]
async fn leave_message_ends_session() {
    let (url, _handle) = start_hub().await;
    let (mut alice, _) = join(&url, "Alice", "A").await;
    let (mut bob, _) = join(&url, "Bob", "B").await;

    send(&mut alice, &ClientMessage::Leave).await;
    wait_for(&mut bob, |e| {
        matches!(e, ServerEvent::PeerLeft { display_name, .. } if display_name == "Alice")
    })
    .await;
}

#[tokio::test]
async fn second_register_updates_profile() {
    let (url, _handle) = start_hub().await;
    let (mut alice, alice_id) = join(&url, "Alice", "A").await;

    send(
        &mut alice,
        &ClientMessage::Register {
            display_name: "Alicia".to_string(),
            role: "B".to_string(),
        },
    )
    .await;

    let registered = wait_for(&mut alice, |e| matches!(e, ServerEvent::Registered { .. })).await;
    assert_eq!(
        registered,
        ServerEvent::Registered {
            identity: alice_id.clone(),
            display_name: "Alicia".to_string(),
            role: Role::B,
        }
    );
    let presence = wait_for(&mut alice, |e| {
        matches!(e, ServerEvent::Presence { peers } if peers.iter().any(|p| p.display_name == "Alicia"))
    })
    .await;
    let ServerEvent::Presence { peers } = presence else {
        unreachable!();
    };
    assert_eq!(peers.len(), 1);
    assert_eq!(peers[0].identity, alice_id);
}
