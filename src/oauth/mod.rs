//! OAuth 2.0 authorization code flow
//!
//! Features:
//! - Authorization URL construction (offline access, forced consent)
//! - One-shot callback server for auth code reception
//! - Code-for-token exchange and userinfo lookup
//! - Unverified ID token decoding for display

mod callback;
mod client;
mod identity;

pub use callback::{AuthorizationCode, CallbackListener, CallbackOutcome, CallbackParams};
pub use client::{OAuthClient, TokenResponse};
pub use identity::{DecodedIdentity, decode_id_token};
