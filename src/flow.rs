//! Login flow orchestration
//!
//! Drives one authorization code login:
//!
//! ```text
//! Init -> AwaitingCode -> CodeReceived -> Exchanging -> Authenticated
//!              |                              |
//!              +------------> Failed <--------+
//! ```
//!
//! Each stage returns a typed [`Error`]; the first failure moves the flow to
//! [`FlowState::Failed`] with the stage recorded. Decoding the identity token
//! for display happens after `Authenticated` and never demotes it.

use std::time::Duration;

use tracing::{info, warn};

use crate::browser::{self, BrowserLauncher};
use crate::config::Config;
use crate::error::FlowStage;
use crate::oauth::{CallbackListener, DecodedIdentity, OAuthClient, TokenResponse, decode_id_token};
use crate::{Error, Result};

/// Where the login currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    /// Nothing started yet
    Init,
    /// Browser sent to the provider, callback server waiting
    AwaitingCode,
    /// Authorization code captured
    CodeReceived,
    /// Token request in flight
    Exchanging,
    /// Identity token obtained
    Authenticated,
    /// Stopped at the given stage
    Failed(FlowStage),
}

/// Result of a successful login
#[derive(Debug, Clone)]
pub struct LoginResult {
    /// Identity token, the bearer credential for the API gateway
    pub id_token: String,
    /// Full token endpoint response
    pub tokens: TokenResponse,
    /// Decoded claims, absent when the token could not be decoded
    pub identity: Option<DecodedIdentity>,
}

/// One authorization code login
pub struct LoginFlow<B> {
    client: OAuthClient,
    browser: B,
    bind_address: String,
    callback_path: String,
    callback_timeout: Duration,
    history: Vec<FlowState>,
}

impl<B: BrowserLauncher> LoginFlow<B> {
    /// Build a flow from loaded configuration
    pub fn from_config(config: &Config, browser: B) -> Result<Self> {
        let client = OAuthClient::with_timeout(config.client.clone(), config.http.timeout)?;

        Ok(Self {
            client,
            browser,
            bind_address: config.callback_bind_address()?,
            callback_path: config.callback_path().to_string(),
            callback_timeout: config.callback.timeout,
            history: vec![FlowState::Init],
        })
    }

    /// OAuth client used by this flow
    pub fn client(&self) -> &OAuthClient {
        &self.client
    }

    /// Current state
    pub fn state(&self) -> FlowState {
        self.history.last().copied().unwrap_or(FlowState::Init)
    }

    /// Every state passed through, oldest first
    pub fn history(&self) -> &[FlowState] {
        &self.history
    }

    /// Bind the configured callback address and run the login
    pub async fn run(&mut self) -> Result<LoginResult> {
        match CallbackListener::bind(&self.bind_address, &self.callback_path).await {
            Ok(listener) => self.run_with_listener(listener).await,
            Err(e) => {
                self.fail(&e);
                Err(e)
            }
        }
    }

    /// Run the login against an already bound callback listener
    pub async fn run_with_listener(&mut self, listener: CallbackListener) -> Result<LoginResult> {
        let result = self.drive(listener).await;
        if let Err(ref e) = result {
            self.fail(e);
        }
        result
    }

    async fn drive(&mut self, listener: CallbackListener) -> Result<LoginResult> {
        let auth_url = self.client.authorization_url();
        info!(url = %auth_url, "Opening browser for authorization");
        eprintln!("Opening browser for authorization: {auth_url}");
        browser::launch(&self.browser, &auth_url);
        self.transition(FlowState::AwaitingCode);

        eprintln!("Waiting for authorization...");
        let code = listener.wait(self.callback_timeout).await?;
        self.transition(FlowState::CodeReceived);
        eprintln!("✓ Authorization code received");

        self.transition(FlowState::Exchanging);
        let tokens = self.client.exchange_code(code).await?;
        let id_token = tokens.id_token.clone().ok_or(Error::MissingIdToken)?;
        self.transition(FlowState::Authenticated);
        eprintln!("✓ ID token received");

        let identity = match decode_id_token(&id_token) {
            Ok(identity) => Some(identity),
            Err(e) => {
                warn!(error = %e, "ID token could not be decoded for display");
                None
            }
        };

        Ok(LoginResult {
            id_token,
            tokens,
            identity,
        })
    }

    fn transition(&mut self, next: FlowState) {
        info!(from = ?self.state(), to = ?next, "Login state changed");
        self.history.push(next);
    }

    fn fail(&mut self, error: &Error) {
        let stage = error.stage();
        warn!(stage = %stage, error = %error, "Login failed");
        self.transition(FlowState::Failed(stage));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::ManualBrowser;

    fn config() -> Config {
        let mut config = Config::default();
        config.client.client_id = "id".to_string();
        config.client.client_secret = "secret".to_string();
        config.callback.timeout = Duration::from_millis(50);
        config
    }

    #[test]
    fn new_flow_starts_in_init() {
        let flow = LoginFlow::from_config(&config(), ManualBrowser).unwrap();
        assert_eq!(flow.state(), FlowState::Init);
        assert_eq!(flow.history(), &[FlowState::Init]);
    }

    #[tokio::test]
    async fn timeout_fails_at_authorization_stage() {
        let flow_config = config();
        let mut flow = LoginFlow::from_config(&flow_config, ManualBrowser).unwrap();
        let listener = CallbackListener::bind("127.0.0.1:0", "/callback").await.unwrap();

        let err = flow.run_with_listener(listener).await.unwrap_err();

        assert!(matches!(err, Error::CallbackTimeout(_)));
        assert_eq!(
            flow.history(),
            &[
                FlowState::Init,
                FlowState::AwaitingCode,
                FlowState::Failed(FlowStage::Authorization)
            ]
        );
    }

    #[tokio::test]
    async fn bind_failure_is_recorded() {
        let occupied = CallbackListener::bind("127.0.0.1:0", "/callback").await.unwrap();
        let mut flow_config = config();
        flow_config.client.redirect_uri =
            url::Url::parse(&format!("http://127.0.0.1:{}/callback", occupied.local_addr().port()))
                .unwrap();
        let mut flow = LoginFlow::from_config(&flow_config, ManualBrowser).unwrap();

        let err = flow.run().await.unwrap_err();

        assert!(matches!(err, Error::Callback(_)));
        assert_eq!(flow.state(), FlowState::Failed(FlowStage::Authorization));
    }
}
