//! Browser-based OAuth 2.0 login for API gateway credentials
//!
//! Runs the authorization code flow against an identity provider (Google by
//! default) and returns the identity token, ready to be sent to an API
//! gateway as a bearer JWT.
//!
//! # Flow
//!
//! 1. Bind a one-shot callback server on the redirect URI's port
//! 2. Send the browser to the provider's consent page
//! 3. Capture the authorization code from the redirect (bounded wait)
//! 4. Exchange the code for tokens at the token endpoint
//! 5. Decode the ID token payload for display (no signature verification)

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod browser;
pub mod cli;
pub mod config;
pub mod error;
pub mod flow;
pub mod oauth;
pub mod output;

pub use error::{Error, FlowStage, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging on stderr, keeping stdout for the token
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        _ => subscriber
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init(),
    }
    .map_err(|e| Error::Internal(format!("Failed to install tracing subscriber: {e}")))
}
