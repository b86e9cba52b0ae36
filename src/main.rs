use anyhow::{Context, Result};
use calrelay::api::create_router;
use calrelay::config::RelayConfig;
use calrelay::oauth::run_state_cleanup;
use calrelay::server::{build_app_state, open_storage};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "calrelay=info".into()),
        )
        .init();

    info!("Calendar relay starting...");

    let config = RelayConfig::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    info!(
        redirect_uri = %config.oauth.redirect_uri,
        redirect_base = %config.server.redirect_base,
        listen_port = config.server.listen_port,
        storage = ?config.storage.backend,
        "Configuration loaded"
    );

    let storage = open_storage(&config.storage)?;
    let state = build_app_state(&config, storage)?;

    tokio::spawn(run_state_cleanup(state.state_manager.clone(), 60));

    let router = create_router(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.server.listen_port))
        .await
        .context("Failed to bind listen port")?;
    info!(port = config.server.listen_port, "Calendar relay listening");

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            tracing::error!(error = %e, "HTTP server error");
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl_c signal")?;
    info!("Shutdown signal received");

    server_handle.abort();
    info!("Calendar relay stopped");

    Ok(())
}
