//! Pull transport: JSON request/response routes for polling clients.
//!
//! Polling clients have no connection the hub can push into. Chat events
//! are read back with `GET /api/history?since=`, presence and typing are
//! queried directly, and everything else waits in the client's mailbox
//! (`GET /api/events`). A client that stops polling is swept by the
//! maintenance task.

use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use huddle_proto::message::ErrorCode;
use huddle_proto::poll::{
    ChatRequest, ChatResponse, DisconnectRequest, DisconnectResponse, ErrorBody, EventsResponse,
    HistoryQuery, HistoryResponse, IdentityQuery, PresenceQuery, PresenceResponse,
    RegisterRequest, RegisterResponse, SignalRequest, SignalResponse, TypingRequest,
    TypingResponse,
};
use huddle_proto::session::Identity;

use crate::error::HubError;
use crate::fanout::Endpoint;
use crate::hub::Hub;

/// Error returned by a polling route.
#[derive(Debug)]
pub enum ApiError {
    /// The hub rejected the request.
    Hub(HubError),
    /// The body or query string could not be decoded.
    Malformed(String),
    /// The request body exceeded the transport limit.
    BodyTooLarge(String),
}

impl From<HubError> for ApiError {
    fn from(e: HubError) -> Self {
        Self::Hub(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            Self::BodyTooLarge(e.body_text())
        } else {
            Self::Malformed(e.body_text())
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(e: QueryRejection) -> Self {
        Self::Malformed(e.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            Self::Hub(e) => {
                let status = match e.code() {
                    ErrorCode::Unregistered | ErrorCode::TargetNotFound => StatusCode::NOT_FOUND,
                    ErrorCode::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
                    _ => StatusCode::BAD_REQUEST,
                };
                (
                    status,
                    ErrorBody {
                        code: e.code(),
                        reason: e.to_string(),
                    },
                )
            }
            Self::Malformed(reason) => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    code: ErrorCode::Malformed,
                    reason,
                },
            ),
            Self::BodyTooLarge(reason) => (
                StatusCode::PAYLOAD_TOO_LARGE,
                ErrorBody {
                    code: ErrorCode::PayloadTooLarge,
                    reason,
                },
            ),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Routes of the polling transport, mounted under `/api`.
pub fn routes() -> Router<Arc<Hub>> {
    Router::new()
        .route("/api/register", post(register))
        .route("/api/chat", post(chat))
        .route("/api/history", get(history))
        .route("/api/typing", post(set_typing).get(typers))
        .route("/api/presence", get(presence))
        .route("/api/signal", post(signal))
        .route("/api/events", get(events))
        .route("/api/disconnect", post(disconnect))
}

async fn register(
    State(hub): State<Arc<Hub>>,
    body: Result<Json<RegisterRequest>, JsonRejection>,
) -> ApiResult<RegisterResponse> {
    let Json(req) = body?;
    let identity = req
        .identity
        .filter(|id| !id.is_blank())
        .unwrap_or_else(Identity::generate);

    let registration = hub
        .register(&identity, &req.display_name, &req.role, Endpoint::Pull)
        .await
        .inspect_err(|e| tracing::warn!(identity = %identity, error = %e, "registration rejected"))?;

    Ok(Json(RegisterResponse {
        identity: registration.profile.identity,
        display_name: registration.profile.display_name,
        role: registration.profile.role,
        history: registration.history,
        last_sequence_id: registration.last_sequence_id,
    }))
}

async fn chat(
    State(hub): State<Arc<Hub>>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> ApiResult<ChatResponse> {
    let Json(req) = body?;
    let event = hub
        .send_chat(&req.identity, req.body, req.content, req.file_name)
        .await?;
    Ok(Json(ChatResponse {
        sequence_id: event.sequence_id,
    }))
}

async fn history(
    State(hub): State<Arc<Hub>>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> ApiResult<HistoryResponse> {
    let Query(query) = query?;
    if let Some(identity) = &query.identity {
        hub.touch(identity);
    }
    Ok(Json(HistoryResponse {
        events: hub.get_history(query.since),
    }))
}

async fn set_typing(
    State(hub): State<Arc<Hub>>,
    body: Result<Json<TypingRequest>, JsonRejection>,
) -> ApiResult<TypingResponse> {
    let Json(req) = body?;
    let typers = hub.set_typing(&req.identity, req.is_typing).await?;
    Ok(Json(TypingResponse { typers }))
}

async fn typers(
    State(hub): State<Arc<Hub>>,
    query: Result<Query<IdentityQuery>, QueryRejection>,
) -> ApiResult<TypingResponse> {
    let Query(query) = query?;
    let typers = hub.typers(&query.identity)?;
    Ok(Json(TypingResponse { typers }))
}

async fn presence(
    State(hub): State<Arc<Hub>>,
    query: Result<Query<PresenceQuery>, QueryRejection>,
) -> ApiResult<PresenceResponse> {
    let Query(query) = query?;
    if let Some(identity) = &query.identity {
        hub.touch(identity);
    }
    Ok(Json(PresenceResponse {
        peers: hub.get_presence(),
    }))
}

async fn signal(
    State(hub): State<Arc<Hub>>,
    body: Result<Json<SignalRequest>, JsonRejection>,
) -> ApiResult<SignalResponse> {
    let Json(req) = body?;
    tracing::debug!(from = %req.identity, to = %req.target, kind = %req.kind, "relaying signal");
    hub.send_signal(&req.identity, &req.target, req.kind, req.payload)
        .await
        .inspect_err(|e| tracing::warn!(identity = %req.identity, error = %e, "signal rejected"))?;
    Ok(Json(SignalResponse { delivered: true }))
}

async fn events(
    State(hub): State<Arc<Hub>>,
    query: Result<Query<IdentityQuery>, QueryRejection>,
) -> ApiResult<EventsResponse> {
    let Query(query) = query?;
    let events = hub.poll_events(&query.identity).await?;
    Ok(Json(EventsResponse { events }))
}

async fn disconnect(
    State(hub): State<Arc<Hub>>,
    body: Result<Json<DisconnectRequest>, JsonRejection>,
) -> ApiResult<DisconnectResponse> {
    let Json(req) = body?;
    let removed = hub.disconnect(&req.identity).await;
    Ok(Json(DisconnectResponse { removed }))
}
