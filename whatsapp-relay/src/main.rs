//! WhatsApp relay web server.
//!
//! This binary:
//! - Answers the WhatsApp webhook subscription handshake
//! - Verifies and processes signed message deliveries
//! - Relays text and voice messages to OpenAI and sends the reply back

use std::net::SocketAddr;

use anyhow::{bail, Context, Result};
use tokio::{net::TcpListener, signal};
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use whatsapp_relay::{router, AppState, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("relay_starting");

    // Load configuration
    let config = Config::from_env();
    info!(
        port = config.port,
        whatsapp_api_base = %config.whatsapp_api_base,
        whatsapp_api_version = %config.whatsapp_api_version,
        openai_api_base = %config.openai_api_base,
        assistant_configured = config.uses_threads(),
        run_timeout_ms = config.run_timeout_ms,
        conversation_ttl_secs = config.conversation_ttl_secs,
        "config_loaded"
    );

    let missing = config.missing_required();
    if !missing.is_empty() {
        error!(missing = ?missing, "config_incomplete");
        bail!("Missing required environment variables: {}", missing.join(", "));
    }

    let port = config.port;
    let state = AppState::new(config).context("Failed to build application state")?;
    let app = router(state);

    // Bind to address
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, "relay_listening");

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("relay_shutdown_complete");

    Ok(())
}

/// Create a future that completes when a shutdown signal is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }

    info!("relay_shutting_down");
}
