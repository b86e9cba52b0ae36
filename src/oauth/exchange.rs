//! Token endpoint calls: authorization-code exchange and refresh.
//!
//! Both send form-encoded bodies and expect a standard OAuth 2.0 JSON token response.

use crate::config::OAuthConfig;
use serde::Deserialize;
use thiserror::Error;

/// Longest token lifetime accepted from the authorization server (one year)
pub const MAX_EXPIRES_IN_SECONDS: i64 = 365 * 24 * 60 * 60;

/// Failure talking to the token endpoint
#[derive(Debug, Error)]
pub enum OAuthError {
    /// Network failure or timeout
    #[error("token endpoint request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-2xx response
    #[error("token endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    /// 2xx response that is not a usable token response
    #[error("malformed token response: {0}")]
    Decode(String),
}

/// OAuth token response (standard OAuth 2.0)
#[derive(Deserialize, Debug, Clone)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// Client for the authorization server's token endpoint.
///
/// Holds the client credentials used for both grant types. The inner
/// `reqwest::Client` carries the configured request timeout.
#[derive(Clone)]
pub struct OAuthClient {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
}

impl OAuthClient {
    pub fn new(http: reqwest::Client, config: &OAuthConfig) -> Self {
        Self {
            http,
            token_url: config.token_url.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_uri: config.redirect_uri.clone(),
        }
    }

    /// Exchange an authorization code for the initial token pair.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenResponse, OAuthError> {
        tracing::debug!(token_url = %self.token_url, "Exchanging authorization code");
        self.post_form(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", &self.redirect_uri),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
        ])
        .await
    }

    /// Mint a new access token from a refresh token.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, OAuthError> {
        tracing::debug!(token_url = %self.token_url, "Refreshing access token");
        self.post_form(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
        ])
        .await
    }

    async fn post_form(&self, form: &[(&str, &str)]) -> Result<TokenResponse, OAuthError> {
        let response = self
            .http
            .post(&self.token_url)
            .header("Accept", "application/json")
            .form(form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(OAuthError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let token: TokenResponse =
            serde_json::from_str(&body).map_err(|e| OAuthError::Decode(e.to_string()))?;

        if token.access_token.is_empty() {
            return Err(OAuthError::Decode("empty access_token".to_string()));
        }
        if let Some(expires_in) = token.expires_in {
            if !(1..=MAX_EXPIRES_IN_SECONDS).contains(&expires_in) {
                return Err(OAuthError::Decode(format!(
                    "expires_in {} out of range",
                    expires_in
                )));
            }
        }

        tracing::debug!(
            has_refresh_token = token.refresh_token.is_some(),
            expires_in = ?token.expires_in,
            "Token endpoint call successful"
        );

        Ok(token)
    }
}
