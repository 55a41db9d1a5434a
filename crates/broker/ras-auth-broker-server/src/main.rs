//! Authentication broker server
//!
//! Accepts client authentication requests on `/ws` and delegates them to the
//! configured identity gateway.

use anyhow::{Context, Result};
use ras_auth_broker::{AuthenticationOrchestrator, ClientConnectionManager};
use ras_auth_broker_server::{AppState, Config, GatewayProviderClient, router, telemetry};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Config::load()?;
    telemetry::init_tracing(&config)?;

    let provider = Arc::new(GatewayProviderClient::new(
        config.provider_url()?,
        config.connection_timeout(),
    ));
    let clients = Arc::new(ClientConnectionManager::new());
    let orchestrator =
        AuthenticationOrchestrator::start(config.orchestrator_config(), provider, clients.clone())
            .await
            .context("Failed to start authentication orchestrator")?;

    let app = router(AppState::new(orchestrator.clone(), clients));

    let addr = config.socket_addr();
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Authentication broker listening on http://{}", addr);
    info!("WebSocket endpoint: ws://{}/ws", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(provider_error) = orchestrator.first_provider_error() {
        warn!("First provider error during run: {}", provider_error);
    }
    orchestrator.dispose().await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
