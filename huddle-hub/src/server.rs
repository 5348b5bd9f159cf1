//! Router assembly, listener and the periodic maintenance task.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::{DefaultBodyLimit, State};
use axum::extract::ws::WebSocketUpgrade;
use axum::response::IntoResponse;
use axum::routing::get;

use crate::config::HubConfig;
use crate::http;
use crate::hub::Hub;
use crate::ws;

/// Builds the router serving both transports over `hub`.
///
/// Request bodies on the polling routes share the WebSocket frame limit.
pub fn router(hub: Arc<Hub>) -> Router {
    let body_limit = ws::max_frame_size(&hub);
    Router::new()
        .route("/ws", get(ws_handler))
        .merge(http::routes())
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(hub)
}

/// Starts the hub on the given address and returns the bound address and a
/// join handle.
///
/// This is the primary entry point used by both `main.rs` and test code.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server(
    addr: &str,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let config = HubConfig::default();
    let hub = Arc::new(Hub::new(config.settings));
    start_server_with_hub(addr, hub, config.sweep_interval).await
}

/// Starts the hub with a pre-configured [`Hub`], running maintenance every
/// `sweep_interval`.
///
/// The maintenance task stops when the server stops.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind to the given address.
pub async fn start_server_with_hub(
    addr: &str,
    hub: Arc<Hub>,
    sweep_interval: Duration,
) -> Result<
    (std::net::SocketAddr, tokio::task::JoinHandle<()>),
    Box<dyn std::error::Error + Send + Sync>,
> {
    let app = router(Arc::clone(&hub));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let bound_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        let maintenance = tokio::spawn(run_maintenance(hub, sweep_interval));
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "hub server error");
        }
        maintenance.abort();
    });

    Ok((bound_addr, handle))
}

/// Sweeps silent polling clients and stale typing flags forever.
async fn run_maintenance(hub: Arc<Hub>, every: Duration) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        let tick = interval.tick().await;
        let report = hub.maintain(tick).await;
        if report.swept > 0 {
            tracing::info!(swept = report.swept, "swept silent polling clients");
        }
    }
}

/// axum handler that upgrades an HTTP request to a WebSocket connection.
async fn ws_handler(ws: WebSocketUpgrade, State(hub): State<Arc<Hub>>) -> impl IntoResponse {
    ws.max_message_size(ws::max_frame_size(&hub))
        .on_upgrade(move |socket| ws::handle_socket(socket, hub))
}
