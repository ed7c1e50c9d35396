//! Error types for the login flow

use std::fmt;
use std::io;
use std::time::Duration;

use thiserror::Error;

/// Result type alias for the login flow
pub type Result<T> = std::result::Result<T, Error>;

/// Login flow errors
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Callback server could not be started or failed while serving
    #[error("Callback server error: {0}")]
    Callback(String),

    /// No redirect reached the callback server in time
    #[error("Authorization timed out after {0:?} waiting for the browser redirect")]
    CallbackTimeout(Duration),

    /// The provider redirected back with an `error` parameter
    #[error("Authorization denied: {error}{}", .description.as_deref().map(|d| format!(" - {d}")).unwrap_or_default())]
    AuthorizationDenied {
        /// OAuth error code (e.g. `access_denied`)
        error: String,
        /// Optional human-readable description
        description: Option<String>,
    },

    /// The redirect carried neither a code nor an error
    #[error("Authorization code missing from redirect")]
    MissingAuthorizationCode,

    /// Token request could not be sent or its body could not be read
    #[error("Token request failed: {0}")]
    TokenRequest(#[source] reqwest::Error),

    /// Token endpoint answered with a non-success status
    #[error("Token exchange failed: HTTP {status} - {body}")]
    TokenExchange {
        /// HTTP status code
        status: u16,
        /// Raw response body
        body: String,
    },

    /// Token endpoint answered with something that is not valid JSON
    #[error("Failed to parse token response: {0}")]
    ResponseParse(String),

    /// Token response lacks a required field
    #[error("Incomplete token response: missing '{0}'")]
    IncompleteTokenResponse(&'static str),

    /// Token response carried no identity token
    #[error("No ID token received from the identity provider")]
    MissingIdToken,

    /// Identity token could not be decoded for display
    #[error("Could not decode ID token: {0}")]
    TokenDecode(String),

    /// Userinfo lookup failed
    #[error("Userinfo request failed: {0}")]
    UserInfo(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Stage of the login flow an error belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowStage {
    /// Loading and validating configuration
    Config,
    /// Browser authorization and callback
    Authorization,
    /// Code-for-token exchange
    TokenExchange,
    /// Identity token decoding
    Decode,
    /// Userinfo lookup
    UserInfo,
    /// Anything else
    Internal,
}

impl FlowStage {
    /// Stable lowercase name used in logs
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Config => "config",
            Self::Authorization => "authorization",
            Self::TokenExchange => "token_exchange",
            Self::Decode => "decode",
            Self::UserInfo => "userinfo",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for FlowStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    /// Stage of the flow that produced this error
    #[must_use]
    pub fn stage(&self) -> FlowStage {
        match self {
            Self::Config(_) => FlowStage::Config,
            Self::Callback(_)
            | Self::CallbackTimeout(_)
            | Self::AuthorizationDenied { .. }
            | Self::MissingAuthorizationCode => FlowStage::Authorization,
            Self::TokenRequest(_)
            | Self::TokenExchange { .. }
            | Self::ResponseParse(_)
            | Self::IncompleteTokenResponse(_)
            | Self::MissingIdToken => FlowStage::TokenExchange,
            Self::TokenDecode(_) => FlowStage::Decode,
            Self::UserInfo(_) => FlowStage::UserInfo,
            Self::Io(_) | Self::Internal(_) => FlowStage::Internal,
        }
    }

    /// Process exit code for this error
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        match self.stage() {
            FlowStage::Config => 2,
            FlowStage::Authorization => 3,
            FlowStage::TokenExchange => 4,
            FlowStage::Decode => 5,
            FlowStage::UserInfo | FlowStage::Internal => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denial_message_includes_description() {
        let err = Error::AuthorizationDenied {
            error: "access_denied".to_string(),
            description: Some("User declined".to_string()),
        };
        assert_eq!(err.to_string(), "Authorization denied: access_denied - User declined");

        let err = Error::AuthorizationDenied {
            error: "access_denied".to_string(),
            description: None,
        };
        assert_eq!(err.to_string(), "Authorization denied: access_denied");
    }

    #[test]
    fn timeout_message_names_the_bound() {
        let err = Error::CallbackTimeout(Duration::from_secs(300));
        assert!(err.to_string().contains("300s"));

        let err = Error::CallbackTimeout(Duration::from_millis(100));
        assert!(err.to_string().contains("after 100ms"), "{err}");
    }

    #[test]
    fn stages_map_to_distinct_exit_codes() {
        assert_eq!(Error::Config("x".into()).exit_code(), 2);
        assert_eq!(Error::MissingAuthorizationCode.exit_code(), 3);
        assert_eq!(
            Error::TokenExchange {
                status: 400,
                body: String::new()
            }
            .exit_code(),
            4
        );
        assert_eq!(Error::MissingIdToken.exit_code(), 4);
        assert_eq!(Error::TokenDecode("x".into()).exit_code(), 5);
        assert_eq!(Error::Internal("x".into()).exit_code(), 1);
    }

    #[test]
    fn missing_id_token_and_missing_code_are_different_stages() {
        assert_eq!(Error::MissingAuthorizationCode.stage(), FlowStage::Authorization);
        assert_eq!(Error::MissingIdToken.stage(), FlowStage::TokenExchange);
    }
}
