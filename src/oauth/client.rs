//! OAuth Client
//!
//! Builds the authorization URL, exchanges the authorization code for
//! tokens, and looks up the userinfo profile.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

use super::callback::AuthorizationCode;
use crate::config::ClientConfig;
use crate::{Error, Result};

/// Tokens returned by the token endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenResponse {
    /// Access token
    pub access_token: String,
    /// Identity token (JWT), present when `openid` was granted
    pub id_token: Option<String>,
    /// Token type (usually "Bearer")
    pub token_type: Option<String>,
    /// Lifetime of the access token in seconds
    pub expires_in: Option<u64>,
    /// Refresh token, present with `access_type=offline`
    pub refresh_token: Option<String>,
    /// Granted scopes
    pub scope: Option<String>,
}

/// Wire shape of the token response; `access_token` is checked after parsing
#[derive(Debug, Deserialize)]
struct RawTokenResponse {
    access_token: Option<String>,
    id_token: Option<String>,
    token_type: Option<String>,
    expires_in: Option<u64>,
    refresh_token: Option<String>,
    scope: Option<String>,
}

impl TryFrom<RawTokenResponse> for TokenResponse {
    type Error = Error;

    fn try_from(raw: RawTokenResponse) -> Result<Self> {
        let access_token = raw
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or(Error::IncompleteTokenResponse("access_token"))?;

        Ok(Self {
            access_token,
            id_token: raw.id_token.filter(|t| !t.is_empty()),
            token_type: raw.token_type,
            expires_in: raw.expires_in,
            refresh_token: raw.refresh_token,
            scope: raw.scope,
        })
    }
}

/// OAuth client for a single configured provider
pub struct OAuthClient {
    /// HTTP client for provider requests
    http_client: Client,

    /// Client identity and endpoints
    config: ClientConfig,
}

impl OAuthClient {
    /// Create a client around an existing HTTP client
    #[must_use]
    pub fn new(http_client: Client, config: ClientConfig) -> Self {
        Self {
            http_client,
            config,
        }
    }

    /// Create a client whose requests time out after `timeout`
    pub fn with_timeout(config: ClientConfig, timeout: Duration) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Internal(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self::new(http_client, config))
    }

    /// Client configuration
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Build the URL the browser is sent to for consent
    #[must_use]
    pub fn authorization_url(&self) -> Url {
        let mut auth_url = self.config.authorization_endpoint.clone();

        {
            let mut params = auth_url.query_pairs_mut();
            params.append_pair("client_id", &self.config.client_id);
            params.append_pair("redirect_uri", self.config.redirect_uri.as_str());
            params.append_pair("scope", &self.config.scope);
            params.append_pair("response_type", "code");
            params.append_pair("access_type", "offline");
            params.append_pair("prompt", "consent");
        }

        auth_url
    }

    /// Exchange an authorization code for tokens
    pub async fn exchange_code(&self, code: AuthorizationCode) -> Result<TokenResponse> {
        let code = code.into_inner();
        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("code", code.as_str()),
            ("grant_type", "authorization_code"),
            ("redirect_uri", self.config.redirect_uri.as_str()),
        ];

        debug!(endpoint = %self.config.token_endpoint, "Exchanging authorization code");

        let response = self
            .http_client
            .post(self.config.token_endpoint.clone())
            .form(&params)
            .send()
            .await
            .map_err(Error::TokenRequest)?;

        let status = response.status();
        let body = response.text().await.map_err(Error::TokenRequest)?;

        if !status.is_success() {
            return Err(Error::TokenExchange {
                status: status.as_u16(),
                body,
            });
        }

        let raw: RawTokenResponse = serde_json::from_str(&body)
            .map_err(|e| Error::ResponseParse(e.to_string()))?;
        let tokens = TokenResponse::try_from(raw)?;

        info!(
            token_type = tokens.token_type.as_deref().unwrap_or("unknown"),
            expires_in = tokens.expires_in,
            has_id_token = tokens.id_token.is_some(),
            has_refresh_token = tokens.refresh_token.is_some(),
            "Tokens received"
        );

        Ok(tokens)
    }

    /// Fetch the userinfo profile for an access token
    pub async fn fetch_userinfo(&self, access_token: &str) -> Result<serde_json::Value> {
        let response = self
            .http_client
            .get(self.config.userinfo_endpoint.clone())
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| Error::UserInfo(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::UserInfo(format!("HTTP {status} - {body}")));
        }

        response
            .json()
            .await
            .map_err(|e| Error::UserInfo(format!("Failed to parse userinfo response: {e}")))
    }
}
