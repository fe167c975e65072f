//! Main Entrypoint for the Callbridge Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Initializing logging.
//! 3. Building the conversation endpoint provider and shared state.
//! 4. Constructing the Axum router.
//! 5. Starting the web server and handling graceful shutdown.

use anyhow::Context;
use callbridge_api::{
    bridge::SessionRegistry, config::Config, router::create_router, state::AppState,
};
use callbridge_core::endpoint::ElevenLabsEndpoints;
use std::{net::SocketAddr, sync::Arc};
use tracing::{info, warn};

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal. Shutting down gracefully...");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing application state...");

    // Conversation sockets are opened over TLS.
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install default crypto provider"))?;

    let missing = config.missing_credentials();
    if !missing.is_empty() {
        warn!(
            ?missing,
            "Conversation credentials are not configured; every call will be hung up"
        );
    }

    // --- 3. Initialize Shared Services ---
    let endpoints = ElevenLabsEndpoints::new(config.elevenlabs_settings())
        .context("Failed to build conversation endpoint client")?;

    let app_state = Arc::new(AppState {
        config: Arc::new(config.clone()),
        registry: Arc::new(SessionRegistry::new()),
        endpoints: Arc::new(endpoints),
    });

    // --- 4. Create Router ---
    let app = create_router(app_state);

    // --- 5. Start Server ---
    info!(
        bind_address = %config.bind_address,
        api_base = %config.elevenlabs_api_base,
        connect_timeout = ?config.ai_connect_timeout,
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server has shut down.");
    Ok(())
}
