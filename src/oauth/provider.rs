//! Authorization endpoint (consent page) URL construction.

use crate::config::OAuthConfig;

/// Where users are sent to grant calendar access
#[derive(Clone, Debug)]
pub struct ConsentEndpoint {
    /// OAuth authorization endpoint URL
    pub auth_url: String,

    /// Requested scopes
    pub scopes: Vec<String>,

    pub client_id: String,

    /// Callback target (must match the one used for the code exchange)
    pub redirect_uri: String,
}

impl ConsentEndpoint {
    pub fn from_config(config: &OAuthConfig) -> Self {
        Self {
            auth_url: config.auth_url.clone(),
            scopes: config.scopes.clone(),
            client_id: config.client_id.clone(),
            redirect_uri: config.redirect_uri.clone(),
        }
    }

    /// Build the consent URL for a pending authorization.
    ///
    /// Requests offline access and forces the consent prompt so the provider
    /// issues a refresh token even for users who authorized before.
    pub fn build_url(&self, state: &str) -> String {
        let scopes = self.scopes.join(" ");
        let params = [
            ("client_id", self.client_id.as_str()),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("response_type", "code"),
            ("scope", scopes.as_str()),
            ("access_type", "offline"),
            ("prompt", "consent"),
            ("state", state),
        ];
        let query = serde_urlencoded::to_string(&params[..]).unwrap_or_default();
        format!("{}?{}", self.auth_url, query)
    }
}
