//! Huddle hub -- presence, chat history and signaling relay.
//!
//! An axum server shared by the voice chat demos. Browsers connect over
//! WebSocket (`/ws`) or poll the JSON routes under `/api`. The hub relays
//! signaling payloads between two participants but never touches media.
//!
//! # Usage
//!
//! ```bash
//! # Run on default address 0.0.0.0:5000
//! cargo run --bin huddle-hub
//!
//! # Run on custom address
//! cargo run --bin huddle-hub -- --bind 127.0.0.1:8080
//!
//! # Or via environment variable
//! HUDDLE_ADDR=127.0.0.1:8080 cargo run --bin huddle-hub
//! ```

use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use huddle_hub::config::{HubCliArgs, HubConfig};
use huddle_hub::hub::Hub;
use huddle_hub::server;
use tracing_appender::non_blocking::WorkerGuard;

#[tokio::main]
async fn main() {
    let cli = HubCliArgs::parse();

    // Load config from CLI args + config file + env vars + defaults.
    let config = match HubConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {e}");
            std::process::exit(1);
        }
    };

    let _guard = init_logging(&config.log_level, config.log_file.as_deref());

    tracing::info!(addr = %config.bind_addr, "starting huddle hub");

    let hub = Arc::new(Hub::new(config.settings.clone()));

    match server::start_server_with_hub(&config.bind_addr, Arc::clone(&hub), config.sweep_interval)
        .await
    {
        Ok((bound_addr, handle)) => {
            tracing::info!(addr = %bound_addr, "hub listening");
            tokio::select! {
                result = handle => {
                    if let Err(e) = result {
                        tracing::error!(error = %e, "hub server task failed");
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    let closed = hub.close_all().await;
                    tracing::info!(closed, "shutting down");
                }
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to start hub");
            std::process::exit(1);
        }
    }
}

/// Initialise tracing with the resolved log level.
///
/// Logs go to stdout unless a file is given, in which case they are written
/// through a non-blocking appender whose guard must be held until shutdown.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let Some(path) = file_path else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
        return None;
    };

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .unwrap_or_else(|| std::ffi::OsStr::new("huddle-hub.log"));
    let file_appender = tracing_appender::rolling::never(dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}
