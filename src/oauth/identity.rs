//! Identity token inspection
//!
//! Decodes the payload of an ID token for display. The signature is never
//! checked, so nothing here may feed an authorization decision.

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::{Error, Result};

/// Claims read from an unverified identity token
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct DecodedIdentity {
    claims: Map<String, Value>,
}

impl DecodedIdentity {
    /// All claims
    pub fn claims(&self) -> &Map<String, Value> {
        &self.claims
    }

    /// A single claim
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.claims.get(name)
    }

    fn str_claim(&self, name: &str) -> Option<&str> {
        self.claims.get(name).and_then(Value::as_str)
    }

    fn time_claim(&self, name: &str) -> Option<DateTime<Utc>> {
        self.claims
            .get(name)
            .and_then(Value::as_i64)
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
    }

    /// `email` claim
    pub fn email(&self) -> Option<&str> {
        self.str_claim("email")
    }

    /// `name` claim
    pub fn name(&self) -> Option<&str> {
        self.str_claim("name")
    }

    /// `sub` claim
    pub fn subject(&self) -> Option<&str> {
        self.str_claim("sub")
    }

    /// `iss` claim
    pub fn issuer(&self) -> Option<&str> {
        self.str_claim("iss")
    }

    /// `aud` claim; may be a string or an array
    pub fn audience(&self) -> Vec<&str> {
        match self.claims.get("aud") {
            Some(Value::String(aud)) => vec![aud.as_str()],
            Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).collect(),
            _ => Vec::new(),
        }
    }

    /// `exp` claim as a timestamp
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.time_claim("exp")
    }

    /// `iat` claim as a timestamp
    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        self.time_claim("iat")
    }
}

/// Decode the payload segment of an identity token without verifying it
pub fn decode_id_token(token: &str) -> Result<DecodedIdentity> {
    let parts: Vec<&str> = token.trim().split('.').collect();
    if parts.len() != 3 {
        return Err(Error::TokenDecode(format!(
            "expected 3 dot-separated segments, found {}",
            parts.len()
        )));
    }

    let payload = URL_SAFE_NO_PAD
        .decode(parts[1].trim_end_matches('='))
        .map_err(|e| Error::TokenDecode(format!("payload is not base64url: {e}")))?;

    let claims: Value = serde_json::from_slice(&payload)
        .map_err(|e| Error::TokenDecode(format!("payload is not JSON: {e}")))?;

    match claims {
        Value::Object(claims) => Ok(DecodedIdentity { claims }),
        other => Err(Error::TokenDecode(format!(
            "payload is not a JSON object: {other}"
        ))),
    }
}
