//! Wiring from configuration to a ready-to-serve application state.

use crate::api::AppState;
use crate::calendar::CalendarClient;
use crate::config::{RelayConfig, StorageBackend, StorageConfig};
use crate::credentials::{CredentialStorage, InMemoryStorage, SqliteStorage};
use crate::oauth::{ConsentEndpoint, OAuthClient, StateManager};
use crate::relay::Relay;
use crate::token::TokenManager;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

/// Open the configured credential backend
pub fn open_storage(config: &StorageConfig) -> Result<Arc<dyn CredentialStorage>> {
    match config.backend {
        StorageBackend::Memory => {
            info!("Using in-memory credential storage (lost on restart)");
            Ok(Arc::new(InMemoryStorage::new()))
        }
        StorageBackend::Sqlite => {
            let key = config
                .encryption_key
                .as_deref()
                .context("storage.encryption_key is required for the sqlite backend")?;
            let storage = SqliteStorage::new(&config.path, key)
                .with_context(|| format!("Failed to open credential database {}", config.path))?;
            info!(path = %config.path, "Using SQLite credential storage");
            Ok(Arc::new(storage))
        }
    }
}

/// Build every component on top of an already-opened storage backend
pub fn build_app_state(config: &RelayConfig, storage: Arc<dyn CredentialStorage>) -> Result<AppState> {
    let http = config.http.build_client()?;

    let oauth = OAuthClient::new(http.clone(), &config.oauth);
    let tokens = Arc::new(TokenManager::new(storage, oauth, &config.tokens));
    let calendar = CalendarClient::new(http, &config.calendar);
    let relay = Arc::new(Relay::new(tokens, calendar, &config.server.redirect_base));

    Ok(AppState {
        relay,
        state_manager: StateManager::new(config.oauth.state_expiry_seconds),
        consent: ConsentEndpoint::from_config(&config.oauth),
    })
}
