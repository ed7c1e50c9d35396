//! OAuth Callback Server
//!
//! A one-shot HTTP server that receives the authorization code after the
//! user approves access in the browser. The first redirect on the callback
//! path is handed to the waiter through a oneshot channel; the server then
//! shuts down and releases its port.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::{Query, Request, State},
    http::StatusCode,
    response::{Html, IntoResponse},
    routing::get,
};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::{Error, Result};

/// How long to let the server finish in-flight responses after the redirect
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// OAuth callback query parameters
#[derive(Debug, Default, Deserialize)]
pub struct CallbackParams {
    /// Authorization code
    pub code: Option<String>,

    /// State parameter (echoed by the provider, not checked)
    pub state: Option<String>,

    /// Error code
    pub error: Option<String>,

    /// Error description
    pub error_description: Option<String>,
}

/// Authorization code captured from the redirect.
///
/// Moved into the token exchange, so it can be spent only once.
pub struct AuthorizationCode(String);

impl AuthorizationCode {
    /// Wrap a raw code
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    /// Borrow the raw code
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the code
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Debug for AuthorizationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthorizationCode(<redacted>)")
    }
}

/// What the first redirect carried
#[derive(Debug)]
pub enum CallbackOutcome {
    /// Provider granted a code
    Code(AuthorizationCode),
    /// Provider redirected with an error
    Denied {
        /// OAuth error code
        error: String,
        /// Optional description
        description: Option<String>,
    },
    /// Neither `code` nor `error` was present
    MissingCode,
}

impl CallbackOutcome {
    fn from_params(params: CallbackParams) -> Self {
        if let Some(error) = params.error {
            return Self::Denied {
                error,
                description: params.error_description,
            };
        }

        match params.code {
            Some(code) if !code.is_empty() => Self::Code(AuthorizationCode::new(code)),
            _ => Self::MissingCode,
        }
    }

    /// Convert into the code, or the matching flow error
    pub fn into_result(self) -> Result<AuthorizationCode> {
        match self {
            Self::Code(code) => Ok(code),
            Self::Denied { error, description } => {
                Err(Error::AuthorizationDenied { error, description })
            }
            Self::MissingCode => Err(Error::MissingAuthorizationCode),
        }
    }
}

/// State shared with the callback handler
struct CallbackState {
    tx: Mutex<Option<oneshot::Sender<CallbackOutcome>>>,
}

/// Aborts the server task if the listener is dropped before `wait` finishes
struct ServerGuard(Option<JoinHandle<()>>);

impl Drop for ServerGuard {
    fn drop(&mut self) {
        if let Some(handle) = self.0.take() {
            handle.abort();
        }
    }
}

/// A bound, running callback server waiting for one redirect
pub struct CallbackListener {
    local_addr: SocketAddr,
    path: String,
    rx: oneshot::Receiver<CallbackOutcome>,
    shutdown: Option<oneshot::Sender<()>>,
    server: ServerGuard,
}

impl CallbackListener {
    /// Bind `addr` and start serving `path`
    pub async fn bind(addr: &str, path: &str) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Callback(format!("Failed to bind callback server on {addr}: {e}")))?;

        let local_addr = listener.local_addr().map_err(|e| {
            Error::Callback(format!("Failed to get callback server address: {e}"))
        })?;

        let path = if path.is_empty() { "/" } else { path }.to_string();
        let (tx, rx) = oneshot::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let app = router(&path, tx);

        let server = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(e) = result {
                warn!(error = %e, "Callback server error");
            }
        });

        info!(addr = %local_addr, path = %path, "OAuth callback server listening");

        Ok(Self {
            local_addr,
            path,
            rx,
            shutdown: Some(shutdown_tx),
            server: ServerGuard(Some(server)),
        })
    }

    /// Address the server actually bound (useful with port 0)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Full callback URL on the bound address
    pub fn callback_url(&self) -> String {
        format!("http://{}{}", self.local_addr, self.path)
    }

    /// Wait up to `timeout` for the redirect, then stop the server.
    ///
    /// The port is released before this returns, whatever the outcome.
    pub async fn wait(mut self, timeout: Duration) -> Result<AuthorizationCode> {
        let received = tokio::time::timeout(timeout, &mut self.rx).await;

        // Redirects arriving from here on are answered with 410
        self.rx.close();
        let received = match received {
            Ok(result) => result.map_err(|_| {
                Error::Callback("Callback channel closed unexpectedly".to_string())
            }),
            // A redirect delivered between the deadline and close() still counts
            Err(_) => self.rx.try_recv().map_err(|_| Error::CallbackTimeout(timeout)),
        };

        self.shutdown().await;

        let outcome = received?;
        debug!(?outcome, "Received OAuth callback");
        outcome.into_result()
    }

    async fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }

        if let Some(mut handle) = self.server.0.take() {
            if tokio::time::timeout(SHUTDOWN_GRACE, &mut handle).await.is_err() {
                debug!("Callback server did not drain in time, aborting");
                handle.abort();
                let _ = handle.await;
            }
        }

        debug!(addr = %self.local_addr, "OAuth callback server stopped");
    }
}

fn router(path: &str, tx: oneshot::Sender<CallbackOutcome>) -> Router {
    let state = Arc::new(CallbackState {
        tx: Mutex::new(Some(tx)),
    });

    Router::new()
        .route(path, get(handle_callback))
        .fallback(|| async { StatusCode::NOT_FOUND })
        .with_state(state)
        .layer(TraceLayer::new_for_http().make_span_with(|request: &Request| {
            // The query string carries the authorization code; record the path only
            tracing::debug_span!(
                "callback_request",
                method = %request.method(),
                path = %request.uri().path()
            )
        }))
}

/// Handle the OAuth callback
async fn handle_callback(
    State(state): State<Arc<CallbackState>>,
    Query(params): Query<CallbackParams>,
) -> impl IntoResponse {
    let Some(tx) = state.tx.lock().await.take() else {
        warn!("Ignoring repeated OAuth callback");
        return (
            StatusCode::GONE,
            Html(error_page(
                "already_completed",
                "This login has already received its redirect.",
            )),
        );
    };

    if tx.is_closed() {
        return late_redirect();
    }

    let outcome = CallbackOutcome::from_params(params);
    let page = match &outcome {
        CallbackOutcome::Code(_) => success_page(),
        CallbackOutcome::Denied { error, description } => error_page(
            error,
            description.as_deref().unwrap_or("The identity provider denied the request."),
        ),
        CallbackOutcome::MissingCode => {
            error_page("missing_code", "Authorization code not provided")
        }
    };

    if tx.send(outcome).is_err() {
        return late_redirect();
    }

    (StatusCode::OK, Html(page))
}

fn late_redirect() -> (StatusCode, Html<String>) {
    warn!("OAuth callback arrived after the login stopped waiting");
    (
        StatusCode::GONE,
        Html(error_page(
            "login_expired",
            "The login stopped waiting for this redirect. Run the command again.",
        )),
    )
}

fn success_page() -> String {
    r#"<!DOCTYPE html>
<html>
<head>
    <title>Authorization Successful</title>
    <style>
        body {
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            display: flex;
            justify-content: center;
            align-items: center;
            height: 100vh;
            margin: 0;
            background: #1e7e34;
            color: white;
        }
        .container { text-align: center; padding: 2rem; }
        h1 { margin: 0 0 0.5rem 0; }
        p { margin: 0; opacity: 0.9; }
    </style>
</head>
<body>
    <div class="container">
        <h1>Authorization successful!</h1>
        <p>You can close this window and return to the terminal.</p>
    </div>
</body>
</html>"#
        .to_string()
}

fn error_page(error: &str, description: &str) -> String {
    let error = escape_html(error);
    let description = escape_html(description);
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>Authorization Failed</title>
    <style>
        body {{
            font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif;
            display: flex;
            justify-content: center;
            align-items: center;
            height: 100vh;
            margin: 0;
            background: #c0392b;
            color: white;
        }}
        .container {{ text-align: center; padding: 2rem; max-width: 400px; }}
        h1 {{ margin: 0 0 0.5rem 0; }}
        p {{ margin: 0; opacity: 0.9; }}
        .error-code {{ font-family: monospace; margin-top: 1rem; opacity: 0.7; }}
    </style>
</head>
<body>
    <div class="container">
        <h1>Authorization Failed</h1>
        <p>{description}</p>
        <p class="error-code">Error: {error}</p>
    </div>
</body>
</html>"#
    )
}

/// Provider-controlled text is reflected into the page
fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use std::io;
    use tower::ServiceExt;
    use tracing_subscriber::fmt::MakeWriter;

    /// Collects formatted log output in memory
    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<std::sync::Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for CapturedLogs {
        type Writer = Self;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn test_callback_params_deserialize() {
        let params: CallbackParams =
            serde_urlencoded::from_str("code=abc123&state=xyz789&scope=openid").unwrap();

        assert_eq!(params.code, Some("abc123".to_string()));
        assert_eq!(params.state, Some("xyz789".to_string()));
        assert!(params.error.is_none());
    }

    #[test]
    fn error_takes_precedence_over_code() {
        let params: CallbackParams =
            serde_urlencoded::from_str("code=abc&error=access_denied").unwrap();

        assert!(matches!(
            CallbackOutcome::from_params(params),
            CallbackOutcome::Denied { error, .. } if error == "access_denied"
        ));
    }

    #[test]
    fn empty_code_is_missing() {
        let params: CallbackParams = serde_urlencoded::from_str("code=").unwrap();
        assert!(matches!(
            CallbackOutcome::from_params(params),
            CallbackOutcome::MissingCode
        ));
    }

    #[test]
    fn outcome_maps_to_typed_errors() {
        let denied = CallbackOutcome::Denied {
            error: "access_denied".to_string(),
            description: None,
        };
        assert!(matches!(
            denied.into_result(),
            Err(Error::AuthorizationDenied { error, .. }) if error == "access_denied"
        ));
        assert!(matches!(
            CallbackOutcome::MissingCode.into_result(),
            Err(Error::MissingAuthorizationCode)
        ));
    }

    #[test]
    fn authorization_code_debug_is_redacted() {
        let code = AuthorizationCode::new("super-secret");
        assert!(!format!("{code:?}").contains("super-secret"));
    }

    #[test]
    fn error_page_escapes_markup() {
        let page = error_page("<script>", "a & b");
        assert!(page.contains("&lt;script&gt;"));
        assert!(page.contains("a &amp; b"));
        assert!(!page.contains("<script>"));
    }

    #[tokio::test]
    async fn request_logs_omit_authorization_code() {
        let logs = CapturedLogs::default();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_ansi(false)
            .with_writer(logs.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let (tx, _rx) = oneshot::channel();
        let response = router("/callback", tx)
            .oneshot(
                Request::get("/callback?code=SUPERSECRETCODE&scope=openid")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let output = logs.contents();
        assert!(output.contains("path=/callback"), "{output}");
        assert!(!output.contains("SUPERSECRETCODE"), "{output}");
    }

    #[tokio::test]
    async fn redirect_after_waiter_gave_up_is_gone() {
        let (tx, mut rx) = oneshot::channel();
        let app = router("/callback", tx);
        rx.close();

        let response = app
            .oneshot(
                Request::get("/callback?code=LATE")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::GONE);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8_lossy(&body).contains("login_expired"));
    }

    #[tokio::test]
    async fn router_delivers_first_redirect_only() {
        let (tx, mut rx) = oneshot::channel();
        let app = router("/callback", tx);

        let first = app
            .clone()
            .oneshot(
                Request::get("/callback?code=ABC123")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        let body = to_bytes(first.into_body(), usize::MAX).await.unwrap();
        assert!(String::from_utf8_lossy(&body).contains("Authorization successful"));

        let second = app
            .oneshot(
                Request::get("/callback?code=STOLEN")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(second.status(), StatusCode::GONE);

        match rx.try_recv().unwrap() {
            CallbackOutcome::Code(code) => assert_eq!(code.as_str(), "ABC123"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn router_ignores_other_paths() {
        let (tx, mut rx) = oneshot::channel();
        let app = router("/callback", tx);

        let response = app
            .oneshot(Request::get("/favicon.ico").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn denial_page_names_the_error() {
        let (tx, _rx) = oneshot::channel();
        let app = router("/callback", tx);

        let response = app
            .oneshot(
                Request::get("/callback?error=access_denied")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = String::from_utf8_lossy(&body);
        assert!(body.contains("Authorization Failed"));
        assert!(body.contains("access_denied"));
    }
}
