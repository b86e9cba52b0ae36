// Configuration (TOML + env)
pub mod config;

// Credential records and storage backends
pub mod credentials;

// Token endpoint client and pending authorizations
pub mod oauth;

// Token lifecycle manager (validity, single-flight refresh)
pub mod token;

// Calendar event submission
pub mod calendar;

// Caller-facing outcomes
pub mod relay;

// HTTP routes
pub mod api;

// Startup wiring
pub mod server;
