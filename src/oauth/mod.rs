//! OAuth 2.0 client side of the authorization-code flow.
//!
//! 1. Caller is sent to `GET /auth?user=<key>`
//! 2. A single-use `state` is minted and the user is redirected to the consent page
//! 3. Provider redirects to `GET /oauth/callback?code=..&state=..`
//! 4. The code is exchanged for tokens and recorded for the user key
//! 5. Later requests refresh the access token with the stored refresh token

mod exchange;
mod provider;
mod state_manager;

pub use exchange::{OAuthClient, OAuthError, TokenResponse, MAX_EXPIRES_IN_SECONDS};
pub use provider::ConsentEndpoint;
pub use state_manager::{run_state_cleanup, PendingAuthorization, StateManager};
