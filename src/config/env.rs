use super::{RelayConfig, StorageBackend};

impl RelayConfig {
    /// Build from an optional TOML file (`CALRELAY_CONFIG`) and env vars, falling back to defaults.
    pub fn from_env() -> anyhow::Result<Self> {
        let mut cfg = match std::env::var("CALRELAY_CONFIG") {
            Ok(path) => super::load_config(&path)?,
            Err(_) => Self::default(),
        };
        cfg.apply_overrides(|key| std::env::var(key).ok());
        Ok(cfg)
    }

    /// Overlay values from `lookup` (normally the process environment).
    /// Unparseable values are ignored and the existing setting is kept.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("CLIENT_ID") {
            self.oauth.client_id = v;
        }
        if let Some(v) = lookup("CLIENT_SECRET") {
            self.oauth.client_secret = v;
        }
        if let Some(v) = lookup("REDIRECT_URI") {
            self.oauth.redirect_uri = v;
        }
        if let Some(v) = lookup("REDIRECT_BASE") {
            self.server.redirect_base = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = lookup("PORT") {
            if let Ok(port) = v.parse::<u16>() {
                self.server.listen_port = port;
            }
        }
        if let Some(v) = lookup("CALRELAY_TIME_ZONE") {
            self.calendar.default_time_zone = Some(v);
        }
        if let Some(v) = lookup("CALRELAY_UTC_OFFSET") {
            self.calendar.default_utc_offset = Some(v);
        }
        if let Some(v) = lookup("CALRELAY_HTTP_TIMEOUT_SECONDS") {
            if let Ok(n) = v.parse::<u64>() {
                self.http.timeout_seconds = n;
            }
        }
        if let Some(v) = lookup("CALRELAY_STORAGE") {
            match v.to_lowercase().as_str() {
                "memory" => self.storage.backend = StorageBackend::Memory,
                "sqlite" => self.storage.backend = StorageBackend::Sqlite,
                other => tracing::warn!(backend = %other, "Unknown CALRELAY_STORAGE value, ignoring"),
            }
        }
        if let Some(v) = lookup("CALRELAY_DB_PATH") {
            self.storage.path = v;
        }
        if let Some(v) = lookup("CALRELAY_ENCRYPTION_KEY") {
            self.storage.encryption_key = Some(v);
        }
    }
}
