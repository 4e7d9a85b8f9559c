//! # Call Bridge - Main Application Entry Point
//!
//! Relays live call audio between a telephony media stream and a voice
//! assistant. The telephony platform asks `/api/v1/calls/flow` where to stream,
//! then opens `/api/v1/calls/media-stream`; each stream gets its own assistant
//! call and one bridge session.
//!
//! ## Application Architecture:
//! - **config**: layered configuration (defaults, `config.toml`, environment)
//! - **state**: shared state, HTTP clients and session counters
//! - **health**: liveness and public URL status endpoints
//! - **handlers**: HTTP handlers for calls, webhooks and config
//! - **websocket**: the telephony-side WebSocket actor
//! - **bridge**: frame model, classification, connections and the session
//! - **audio**: aggregation and resampling of assistant audio
//! - **clients**: the assistant API and ngrok agent
//! - **error**: error types and HTTP error responses

mod audio;
mod bridge;
mod clients;
mod config;
mod error;
mod handlers;
mod health;
mod state;
mod websocket;

use crate::config::AppConfig;
use crate::state::AppState;
use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::Result;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[actix_web::main]
async fn main() -> Result<()> {
    // A missing .env file is fine
    dotenv::dotenv().ok();

    init_tracing()?;

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting call-bridge v{}", env!("CARGO_PKG_VERSION"));
    info!(
        host = %config.server.host,
        port = config.server.port,
        flush_threshold = config.bridge.flush_threshold,
        source_rate = config.bridge.source_sample_rate,
        target_rate = config.bridge.target_sample_rate,
        "Configuration loaded"
    );
    if config.assistant.api_key.is_empty() || config.assistant.assistant_id.is_empty() {
        error!("Assistant credentials are not configured; media streams will be closed");
    }

    let app_state = web::Data::new(AppState::new(config.clone())?);
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    info!("Starting HTTP server on {}", bind_addr);

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(app_state.clone())
            .wrap(cors)
            .wrap(TracingLogger::default())
            .route("/", web::get().to(health::root))
            .route("/health", web::get().to(health::health_check))
            .route("/public-url", web::get().to(health::public_url_status))
            .route("/ngrok-status", web::get().to(health::public_url_status))
            .service(
                web::scope("/api/v1")
                    .route("/config", web::get().to(handlers::get_config))
                    .route("/calls/flow", web::post().to(handlers::stream_flow))
                    .route("/calls/media-stream", web::get().to(handlers::media_stream))
                    .route("/webhooks/receiver", web::post().to(handlers::webhook_receiver)),
            )
    })
    .bind(&bind_addr)?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(Err(e)) => error!("Server error: {}", e),
                Err(e) => error!("Server task error: {}", e),
                Ok(Ok(())) => {}
            }
        }
        signal = wait_for_shutdown() => {
            if let Err(e) = signal {
                error!("Failed to install signal handlers: {}", e);
            }
            info!("Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// Console logging filtered by `RUST_LOG`.
///
/// Defaults to `call_bridge=debug,actix_web=info`.
fn init_tracing() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "call_bridge=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;

    Ok(())
}

/// Resolve on SIGTERM or SIGINT.
async fn wait_for_shutdown() -> std::io::Result<()> {
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    tokio::select! {
        _ = sigterm.recv() => info!("Received SIGTERM"),
        _ = sigint.recv() => info!("Received SIGINT"),
    }

    Ok(())
}
