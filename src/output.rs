//! Rendering login results for standard output

use std::fmt::Write as _;

use serde::Serialize;
use serde_json::Value;

use crate::flow::LoginResult;
use crate::oauth::{DecodedIdentity, TokenResponse};
use crate::{Error, Result};

const RULE: &str = "==================================================";

/// Everything printed after a successful login, in JSON form
#[derive(Debug, Serialize)]
struct LoginReport<'a> {
    id_token: &'a str,
    claims: Option<&'a DecodedIdentity>,
    tokens: &'a TokenResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    userinfo: Option<&'a Value>,
}

/// Human-readable login summary
pub fn render_login_text(result: &LoginResult, userinfo: Option<&Value>) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "\n{RULE}");
    let _ = writeln!(out, "AUTHENTICATION SUCCESSFUL");
    let _ = writeln!(out, "{RULE}");

    if let Some(identity) = &result.identity {
        let _ = writeln!(
            out,
            "User: {} ({})",
            identity.name().unwrap_or("Unknown"),
            identity.email().unwrap_or("no email")
        );
        if let Some(exp) = identity.expires_at() {
            let _ = writeln!(out, "Expires: {}", exp.to_rfc3339());
        }
    }

    let _ = writeln!(out, "\nID token (bearer JWT for the API gateway):");
    let _ = writeln!(out, "{}", result.id_token);
    let _ = writeln!(out, "\n{RULE}");

    match &result.identity {
        Some(identity) => {
            let _ = writeln!(out, "JWT payload:");
            let _ = writeln!(out, "{}", pretty(identity));
        }
        None => {
            let _ = writeln!(out, "JWT payload: <could not be decoded>");
        }
    }

    if let Some(info) = userinfo {
        let _ = writeln!(out, "\nUserinfo:");
        let _ = writeln!(out, "{}", pretty(info));
    }

    out
}

/// Machine-readable login summary
pub fn render_login_json(result: &LoginResult, userinfo: Option<&Value>) -> Result<String> {
    let report = LoginReport {
        id_token: &result.id_token,
        claims: result.identity.as_ref(),
        tokens: &result.tokens,
        userinfo,
    };
    serde_json::to_string_pretty(&report)
        .map_err(|e| Error::Internal(format!("Failed to serialize report: {e}")))
}

/// Claims of a standalone decoded token
pub fn render_claims(identity: &DecodedIdentity) -> String {
    pretty(identity)
}

fn pretty<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "<unprintable>".to_string())
}
