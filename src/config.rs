//! Configuration management
//!
//! Layering (later wins):
//!
//! 1. Built-in defaults (Google endpoints, `http://localhost:8080/callback`)
//! 2. Config file: the provider's client-secrets JSON download, or YAML
//! 3. `IDTOKEN_LOGIN_*` environment variables (nested with `__`)

use std::{fmt, fs, path::Path, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Yaml},
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{Error, Result};

/// Environment variable prefix for config overrides
pub const ENV_PREFIX: &str = "IDTOKEN_LOGIN_";

const DEFAULT_AUTHORIZATION_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/auth";
const DEFAULT_TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
const DEFAULT_USERINFO_ENDPOINT: &str = "https://www.googleapis.com/oauth2/v2/userinfo";
const DEFAULT_REDIRECT_URI: &str = "http://localhost:8080/callback";
const DEFAULT_SCOPE: &str = "openid email profile";

fn builtin_url(raw: &'static str) -> Url {
    Url::parse(raw).expect("built-in URL constants are valid")
}

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// OAuth client identity and provider endpoints
    pub client: ClientConfig,
    /// Local callback server settings
    pub callback: CallbackConfig,
    /// Outbound HTTP settings
    pub http: HttpConfig,
}

/// OAuth client identity and provider endpoints
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// OAuth client ID
    pub client_id: String,
    /// OAuth client secret
    pub client_secret: String,
    /// Provider authorization endpoint (the browser is sent here)
    pub authorization_endpoint: Url,
    /// Provider token endpoint
    pub token_endpoint: Url,
    /// Provider userinfo endpoint
    pub userinfo_endpoint: Url,
    /// Redirect URI registered with the provider; the callback server
    /// listens on its port and path
    pub redirect_uri: Url,
    /// Space-separated scopes
    pub scope: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            authorization_endpoint: builtin_url(DEFAULT_AUTHORIZATION_ENDPOINT),
            token_endpoint: builtin_url(DEFAULT_TOKEN_ENDPOINT),
            userinfo_endpoint: builtin_url(DEFAULT_USERINFO_ENDPOINT),
            redirect_uri: builtin_url(DEFAULT_REDIRECT_URI),
            scope: DEFAULT_SCOPE.to_string(),
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("authorization_endpoint", &self.authorization_endpoint.as_str())
            .field("token_endpoint", &self.token_endpoint.as_str())
            .field("userinfo_endpoint", &self.userinfo_endpoint.as_str())
            .field("redirect_uri", &self.redirect_uri.as_str())
            .field("scope", &self.scope)
            .finish()
    }
}

/// Local callback server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CallbackConfig {
    /// Host/IP to bind; port and path come from `client.redirect_uri`
    pub host: String,
    /// How long to wait for the browser redirect
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for CallbackConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            timeout: Duration::from_secs(300),
        }
    }
}

/// Outbound HTTP settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Per-request timeout for provider calls
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
        }
    }
}

/// Client-secrets file as downloaded from the provider console.
///
/// Web applications nest the fields under `web`, desktop apps under
/// `installed`.
#[derive(Debug, Deserialize)]
struct ClientSecretsFile {
    #[serde(alias = "installed")]
    web: ClientSecrets,
}

#[derive(Debug, Deserialize)]
struct ClientSecrets {
    client_id: String,
    client_secret: String,
    auth_uri: Option<Url>,
    token_uri: Option<Url>,
}

/// Subset of [`ClientConfig`] supplied by a client-secrets file
#[derive(Serialize)]
struct ClientSecretsOverlay {
    client_id: String,
    client_secret: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    authorization_endpoint: Option<Url>,
    #[serde(skip_serializing_if = "Option::is_none")]
    token_endpoint: Option<Url>,
}

impl ClientSecretsFile {
    fn read(path: &Path) -> Result<ClientSecretsOverlay> {
        let raw = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Cannot read {}: {e}", path.display())))?;
        let file: Self = serde_json::from_str(&raw).map_err(|e| {
            Error::Config(format!("Invalid client secrets file {}: {e}", path.display()))
        })?;

        Ok(ClientSecretsOverlay {
            client_id: file.web.client_id,
            client_secret: file.web.client_secret,
            authorization_endpoint: file.web.auth_uri,
            token_endpoint: file.web.token_uri,
        })
    }
}

impl Config {
    /// Load configuration from defaults, an optional file, and the environment
    ///
    /// The result is not validated; apply command-line overrides first, then
    /// call [`Config::validate`].
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }

            let is_json = p
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

            figment = if is_json {
                figment.merge(Serialized::default("client", ClientSecretsFile::read(p)?))
            } else {
                figment.merge(Yaml::file(p))
            };
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))
    }

    /// Apply command-line overrides on top of the loaded layers
    pub fn apply_overrides(&mut self, redirect_uri: Option<Url>, callback_timeout: Option<Duration>) {
        if let Some(uri) = redirect_uri {
            self.client.redirect_uri = uri;
        }
        if let Some(timeout) = callback_timeout {
            self.callback.timeout = timeout;
        }
    }

    /// Check the invariants the login flow relies on
    pub fn validate(&self) -> Result<()> {
        if self.client.client_id.trim().is_empty() {
            return Err(Error::Config("client_id is required".to_string()));
        }
        if self.client.client_secret.trim().is_empty() {
            return Err(Error::Config("client_secret is required".to_string()));
        }

        let redirect = &self.client.redirect_uri;
        if redirect.scheme() != "http" {
            return Err(Error::Config(format!(
                "redirect_uri must use http for the local callback server, got {redirect}"
            )));
        }
        if redirect.host_str().is_none() {
            return Err(Error::Config(format!("redirect_uri has no host: {redirect}")));
        }
        if self.callback.host.trim().is_empty() {
            return Err(Error::Config("callback.host is required".to_string()));
        }
        if self.callback.timeout.is_zero() {
            return Err(Error::Config("callback.timeout must be positive".to_string()));
        }

        Ok(())
    }

    /// Socket address string the callback server binds to
    pub fn callback_bind_address(&self) -> Result<String> {
        let port = self
            .client
            .redirect_uri
            .port_or_known_default()
            .ok_or_else(|| Error::Config("redirect_uri has no port".to_string()))?;

        let host = &self.callback.host;
        if host.contains(':') && !host.starts_with('[') {
            Ok(format!("[{host}]:{port}"))
        } else {
            Ok(format!("{host}:{port}"))
        }
    }

    /// Request path the callback server answers on
    pub fn callback_path(&self) -> &str {
        self.client.redirect_uri.path()
    }
}
