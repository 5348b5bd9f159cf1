//! Push transport: one worker per WebSocket connection.
//!
//! Each connection is assigned a fresh [`Identity`]. The worker waits for a
//! `register` frame, then splits into a reader loop that feeds client
//! messages to the [`Hub`] and a writer task that drains the connection's
//! outbound channel. Whichever ends first ends the connection, and the
//! identity is disconnected.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use huddle_proto::codec;
use huddle_proto::message::{ClientMessage, ErrorCode, ServerEvent};
use huddle_proto::session::Identity;
use tokio::sync::mpsc;

use crate::error::HubError;
use crate::fanout::Endpoint;
use crate::hub::Hub;

/// Allowance for the JSON envelope around a chat body or signal payload.
const FRAME_OVERHEAD: usize = 64 * 1024;

/// Largest text frame accepted from a client.
#[must_use]
pub fn max_frame_size(hub: &Hub) -> usize {
    hub.settings().max_payload_size.saturating_add(FRAME_OVERHEAD)
}

/// Handles an upgraded WebSocket connection for a single client.
///
/// The connection lifecycle:
/// 1. Wait for a `Register` message (other requests are refused).
/// 2. Register with the hub, which queues `Registered` and `History`.
/// 3. Start the writer task draining the outbound channel.
/// 4. Enter the message loop, dispatching requests to the hub.
/// 5. On close, leave, or write failure, disconnect the identity.
pub async fn handle_socket(socket: WebSocket, hub: Arc<Hub>) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let identity = Identity::generate();
    let max_frame = max_frame_size(&hub);

    tracing::info!(identity = %identity, "connection opened");

    let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();
    if !wait_for_register(&mut ws_sender, &mut ws_receiver, &hub, &identity, &tx, max_frame).await {
        tracing::info!(identity = %identity, "connection closed before registration");
        return;
    }

    // Only the hub holds a strong sender from here on, so detaching the
    // endpoint closes the channel and ends the writer.
    let reply = tx.downgrade();
    drop(tx);

    let writer_identity = identity.clone();
    let mut write_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let text = match codec::encode_event(&event) {
                Ok(t) => t,
                Err(e) => {
                    tracing::error!(identity = %writer_identity, error = %e, "failed to encode event");
                    continue;
                }
            };
            if ws_sender.send(Message::Text(text.into())).await.is_err() {
                tracing::warn!(identity = %writer_identity, "WebSocket write failed");
                break;
            }
        }
        let _ = ws_sender.close().await;
    });

    let reader_identity = identity.clone();
    let reader_hub = Arc::clone(&hub);
    let mut read_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_receiver.next().await {
            match msg {
                Message::Text(text) => {
                    let msg = match codec::decode_client(text.as_str(), max_frame) {
                        Ok(m) => m,
                        Err(e) => {
                            tracing::warn!(identity = %reader_identity, error = %e, "failed to decode message");
                            reply_error(&reply, ErrorCode::Malformed, e.to_string());
                            continue;
                        }
                    };
                    if matches!(msg, ClientMessage::Leave) {
                        tracing::info!(identity = %reader_identity, "client left");
                        break;
                    }
                    handle_client_message(&reader_hub, &reader_identity, msg, &reply).await;
                }
                Message::Close(_) => {
                    tracing::info!(identity = %reader_identity, "received close frame");
                    break;
                }
                Message::Binary(_) => {
                    reply_error(&reply, ErrorCode::Malformed, "binary frames are not supported".into());
                }
                _ => {
                    // Ping/pong keep the connection alive.
                    reader_hub.touch(&reader_identity);
                }
            }
        }
    });

    tokio::select! {
        _ = &mut read_task => {
            write_task.abort();
        }
        _ = &mut write_task => {
            read_task.abort();
        }
    }

    hub.disconnect(&identity).await;
    tracing::info!(identity = %identity, "connection closed");
}

/// Reads frames until a valid `register` is accepted by the hub.
///
/// Rejections are answered directly on the socket and the client may retry.
/// Returns `false` if the connection closes first.
async fn wait_for_register(
    ws_sender: &mut (impl SinkExt<Message, Error = axum::Error> + Unpin),
    ws_receiver: &mut (impl StreamExt<Item = Result<Message, axum::Error>> + Unpin),
    hub: &Hub,
    identity: &Identity,
    tx: &mpsc::UnboundedSender<ServerEvent>,
    max_frame: usize,
) -> bool {
    while let Some(Ok(msg)) = ws_receiver.next().await {
        let text = match msg {
            Message::Text(text) => text,
            Message::Close(_) => return false,
            _ => continue,
        };
        let rejection = match codec::decode_client(text.as_str(), max_frame) {
            Ok(ClientMessage::Register { display_name, role }) => {
                match hub
                    .register(identity, &display_name, &role, Endpoint::Push(tx.clone()))
                    .await
                {
                    Ok(_) => return true,
                    Err(e) => {
                        tracing::warn!(identity = %identity, error = %e, "registration rejected");
                        error_event(&e)
                    }
                }
            }
            Ok(ClientMessage::Leave) => return false,
            Ok(other) => {
                tracing::warn!(identity = %identity, msg = ?other, "expected register");
                error_event(&HubError::Unregistered(identity.clone()))
            }
            Err(e) => {
                tracing::warn!(identity = %identity, error = %e, "failed to decode registration");
                ServerEvent::Error {
                    code: ErrorCode::Malformed,
                    reason: e.to_string(),
                }
            }
        };
        if let Err(e) = send_direct(ws_sender, &rejection).await {
            tracing::warn!(identity = %identity, error = %e, "failed to send rejection");
            return false;
        }
    }
    false
}

/// Dispatches one request from a registered client.
async fn handle_client_message(
    hub: &Hub,
    identity: &Identity,
    msg: ClientMessage,
    reply: &mpsc::WeakUnboundedSender<ServerEvent>,
) {
    let result = match msg {
        ClientMessage::Chat {
            body,
            content,
            file_name,
        } => hub.send_chat(identity, body, content, file_name).await.map(|_| ()),
        ClientMessage::Typing { is_typing } => hub.set_typing(identity, is_typing).await.map(|_| ()),
        ClientMessage::Signal {
            target,
            kind,
            payload,
        } => {
            tracing::debug!(from = %identity, to = %target, kind = %kind, "relaying signal");
            hub.send_signal(identity, &target, kind, payload).await
        }
        ClientMessage::Register { display_name, role } => match reply.upgrade() {
            Some(sender) => hub
                .register(identity, &display_name, &role, Endpoint::Push(sender))
                .await
                .map(|_| ()),
            None => Ok(()),
        },
        ClientMessage::Leave => Ok(()),
    };

    match result {
        Ok(()) => {}
        Err(HubError::Empty) => {
            tracing::debug!(identity = %identity, "ignored empty chat message");
        }
        Err(e) => {
            tracing::warn!(identity = %identity, error = %e, "request rejected");
            if let Some(sender) = reply.upgrade() {
                let _ = sender.send(error_event(&e));
            }
        }
    }
}

fn error_event(err: &HubError) -> ServerEvent {
    ServerEvent::Error {
        code: err.code(),
        reason: err.to_string(),
    }
}

fn reply_error(reply: &mpsc::WeakUnboundedSender<ServerEvent>, code: ErrorCode, reason: String) {
    if let Some(sender) = reply.upgrade() {
        let _ = sender.send(ServerEvent::Error { code, reason });
    }
}

/// Encodes and sends an event directly on a WebSocket sender.
async fn send_direct(
    ws_sender: &mut (impl SinkExt<Message, Error = axum::Error> + Unpin),
    event: &ServerEvent,
) -> Result<(), String> {
    let text = codec::encode_event(event).map_err(|e| e.to_string())?;
    ws_sender
        .send(Message::Text(text.into()))
        .await
        .map_err(|e| format!("WebSocket send error: {e}"))
}
