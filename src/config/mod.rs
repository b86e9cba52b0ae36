pub mod env;

use crate::calendar::validate_offset;
use crate::oauth::MAX_EXPIRES_IN_SECONDS;
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::time::Duration;

/// Complete relay configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RelayConfig {
    #[serde(default)]
    pub oauth: OAuthConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub calendar: CalendarConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub tokens: TokenConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

/// OAuth client registration and authorization-server endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct OAuthConfig {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    /// Callback target registered with the authorization server
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,
    #[serde(default = "default_auth_url")]
    pub auth_url: String,
    #[serde(default = "default_token_url")]
    pub token_url: String,
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
    /// How long a pending `/auth` redirect stays valid
    #[serde(default = "default_state_expiry")]
    pub state_expiry_seconds: i64,
}

fn default_redirect_uri() -> String {
    "http://localhost:3000/oauth/callback".to_string()
}

fn default_auth_url() -> String {
    "https://accounts.google.com/o/oauth2/v2/auth".to_string()
}

fn default_token_url() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

fn default_scopes() -> Vec<String> {
    vec!["https://www.googleapis.com/auth/calendar.events".to_string()]
}

fn default_state_expiry() -> i64 {
    600
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            redirect_uri: default_redirect_uri(),
            auth_url: default_auth_url(),
            token_url: default_token_url(),
            scopes: default_scopes(),
            state_expiry_seconds: default_state_expiry(),
        }
    }
}

/// Inbound HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Public base URL used to build the `auth_url` handed back to callers
    #[serde(default = "default_redirect_base")]
    pub redirect_base: String,
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
}

fn default_redirect_base() -> String {
    "http://localhost:3000".to_string()
}

fn default_listen_port() -> u16 {
    3000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            redirect_base: default_redirect_base(),
            listen_port: default_listen_port(),
        }
    }
}

/// Calendar provider configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CalendarConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_calendar_id")]
    pub calendar_id: String,
    /// IANA zone applied when a request names neither a zone nor an offset
    #[serde(default)]
    pub default_time_zone: Option<String>,
    /// Offset such as "-04:00" appended when a request names neither a zone nor an offset
    #[serde(default)]
    pub default_utc_offset: Option<String>,
}

fn default_api_base() -> String {
    "https://www.googleapis.com/calendar/v3".to_string()
}

fn default_calendar_id() -> String {
    "primary".to_string()
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            calendar_id: default_calendar_id(),
            default_time_zone: None,
            default_utc_offset: None,
        }
    }
}

/// Outbound HTTP client configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

fn default_timeout() -> u64 {
    10
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout(),
        }
    }
}

impl HttpConfig {
    /// Build the shared outbound client. Every call made through it is bounded by the timeout.
    pub fn build_client(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(self.timeout_seconds))
            .build()
            .context("Failed to build HTTP client")
    }
}

/// Token lifecycle tuning
#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    /// Tokens expiring within this margin are refreshed before use
    #[serde(default = "default_refresh_margin")]
    pub refresh_margin_seconds: i64,
    /// Lifetime assumed when the authorization server omits `expires_in`
    #[serde(default = "default_expires_in")]
    pub default_expires_in_seconds: i64,
}

fn default_refresh_margin() -> i64 {
    60
}

fn default_expires_in() -> i64 {
    3600
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            refresh_margin_seconds: default_refresh_margin(),
            default_expires_in_seconds: default_expires_in(),
        }
    }
}

/// Which credential backend to use
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Sqlite,
}

/// Credential storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    #[serde(default = "default_db_path")]
    pub path: String,
    /// Base64-encoded 32-byte key, required by the sqlite backend
    #[serde(default)]
    pub encryption_key: Option<String>,
}

fn default_db_path() -> String {
    "calrelay.db".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            path: default_db_path(),
            encryption_key: None,
        }
    }
}

impl RelayConfig {
    /// Check that the settings needed to talk to the authorization server are present.
    pub fn validate(&self) -> Result<()> {
        if self.oauth.client_id.is_empty() {
            bail!("oauth.client_id is not set (CLIENT_ID)");
        }
        if self.oauth.client_secret.is_empty() {
            bail!("oauth.client_secret is not set (CLIENT_SECRET)");
        }
        if self.storage.backend == StorageBackend::Sqlite && self.storage.encryption_key.is_none() {
            bail!("storage.encryption_key is required for the sqlite backend (CALRELAY_ENCRYPTION_KEY)");
        }
        if self.http.timeout_seconds == 0 {
            bail!("http.timeout_seconds must be greater than zero");
        }
        if let Some(offset) = self.calendar.default_utc_offset.as_deref() {
            validate_offset(offset)
                .context("calendar.default_utc_offset is invalid (CALRELAY_UTC_OFFSET)")?;
        }
        if !(1..=MAX_EXPIRES_IN_SECONDS).contains(&self.tokens.default_expires_in_seconds) {
            bail!(
                "tokens.default_expires_in_seconds must be between 1 and {}",
                MAX_EXPIRES_IN_SECONDS
            );
        }
        if !(0..MAX_EXPIRES_IN_SECONDS).contains(&self.tokens.refresh_margin_seconds) {
            bail!("tokens.refresh_margin_seconds is out of range");
        }
        Ok(())
    }
}

/// Load configuration from TOML file
pub fn load_config(path: &str) -> Result<RelayConfig> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read config {}", path))?;
    let config: RelayConfig =
        toml::from_str(&contents).with_context(|| format!("Failed to parse config {}", path))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RelayConfig::default();
        assert_eq!(config.oauth.token_url, "https://oauth2.googleapis.com/token");
        assert_eq!(config.server.listen_port, 3000);
        assert_eq!(config.calendar.calendar_id, "primary");
        assert_eq!(config.http.timeout_seconds, 10);
        assert_eq!(config.tokens.refresh_margin_seconds, 60);
        assert_eq!(config.tokens.default_expires_in_seconds, 3600);
        assert_eq!(config.storage.backend, StorageBackend::Memory);
    }

    #[test]
    fn test_config_deserialization() {
        let toml = r#"
            [oauth]
            client_id = "cid"
            client_secret = "secret"
            redirect_uri = "https://relay.example.com/oauth/callback"

            [server]
            redirect_base = "https://relay.example.com"
            listen_port = 8080

            [calendar]
            default_time_zone = "America/New_York"

            [http]
            timeout_seconds = 5

            [storage]
            backend = "sqlite"
            path = "/var/lib/calrelay/creds.db"
            encryption_key = "AAAA"
        "#;

        let config: RelayConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.oauth.client_id, "cid");
        assert_eq!(config.server.listen_port, 8080);
        assert_eq!(
            config.calendar.default_time_zone.as_deref(),
            Some("America/New_York")
        );
        assert_eq!(config.http.timeout_seconds, 5);
        assert_eq!(config.storage.backend, StorageBackend::Sqlite);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_config() {
        let toml = r#"
            [server]
            listen_port = 9000
        "#;

        let config: RelayConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.server.listen_port, 9000);
        assert_eq!(config.server.redirect_base, "http://localhost:3000"); // Default
        assert_eq!(config.oauth.scopes.len(), 1); // Default
    }

    #[test]
    fn test_validate_requires_client_credentials() {
        let mut config = RelayConfig::default();
        assert!(config.validate().is_err());

        config.oauth.client_id = "cid".to_string();
        assert!(config.validate().is_err());

        config.oauth.client_secret = "secret".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_sqlite_needs_key() {
        let mut config = RelayConfig::default();
        config.oauth.client_id = "cid".to_string();
        config.oauth.client_secret = "secret".to_string();
        config.storage.backend = StorageBackend::Sqlite;
        assert!(config.validate().is_err());

        config.storage.encryption_key = Some("key".to_string());
        assert!(config.validate().is_ok());
    }

    fn valid_config() -> RelayConfig {
        let mut config = RelayConfig::default();
        config.oauth.client_id = "cid".to_string();
        config.oauth.client_secret = "secret".to_string();
        config
    }

    #[test]
    fn test_validate_default_utc_offset() {
        let mut config = valid_config();
        config.calendar.default_utc_offset = Some("-05:00".to_string());
        assert!(config.validate().is_ok());

        config.calendar.default_utc_offset = Some("EST".to_string());
        let err = config.validate().unwrap_err();
        assert!(format!("{:#}", err).contains("default_utc_offset"));
    }

    #[test]
    fn test_validate_token_lifetimes() {
        let mut config = valid_config();
        config.tokens.default_expires_in_seconds = 0;
        assert!(config.validate().is_err());

        config.tokens.default_expires_in_seconds = i64::MAX;
        assert!(config.validate().is_err());

        config.tokens.default_expires_in_seconds = 3600;
        config.tokens.refresh_margin_seconds = -1;
        assert!(config.validate().is_err());
    }
}
