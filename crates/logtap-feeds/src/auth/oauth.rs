//! Browser OAuth with a loopback redirect.
//!
//! The acquisition flow:
//!
//! 1. bind an axum server on `127.0.0.1:0`,
//! 2. open the consent page with that server as the redirect URI,
//! 3. wait for the redirect to deliver the authorization code,
//! 4. exchange the code at the token endpoint and store the result.
//!
//! As a [`TokenSource`], the same client serves the stored access token and
//! refreshes it when it is about to expire.

use super::{AuthError, CredentialAcquirer, TokenSource};
use crate::remote::http::{check_status, https_client, read_json, HttpsClient};
use async_trait::async_trait;
use axum::extract::{Query, State};
use axum::response::Html;
use axum::routing::get;
use axum::Router;
use bytes::Bytes;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use http_body_util::Full;
use hyper::header::{ACCEPT, CONTENT_TYPE};
use hyper::{Method, Request};
use logtap_core::config::RemoteConfig;
use logtap_core::{FeedError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub const SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/logging.read",
    "https://www.googleapis.com/auth/cloud-platform.read-only",
];

/// Treat tokens this close to expiry as expired.
const EXPIRY_SKEW_SECS: i64 = 60;

#[derive(Debug, Clone)]
pub struct OAuthSettings {
    pub client_id: String,
    pub client_secret: String,
    pub auth_uri: String,
    pub token_uri: String,
    pub credentials_path: PathBuf,
    pub login_timeout: Duration,
}

impl OAuthSettings {
    pub fn from_config(remote: &RemoteConfig) -> Self {
        Self {
            client_id: remote.oauth_client_id.clone(),
            client_secret: remote.oauth_client_secret.clone(),
            auth_uri: remote.auth_uri.clone(),
            token_uri: remote.token_uri.clone(),
            credentials_path: remote.credentials_path(),
            login_timeout: Duration::from_secs(300),
        }
    }
}

/// Credentials persisted between runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCredentials {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl StoredCredentials {
    fn from_response(response: TokenResponse, previous_refresh: Option<String>, now: DateTime<Utc>) -> Self {
        Self {
            access_token: response.access_token,
            // refresh responses usually omit the refresh token
            refresh_token: response.refresh_token.or(previous_refresh),
            expires_at: response
                .expires_in
                .map(|secs| now + ChronoDuration::seconds(secs)),
        }
    }

    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(at) => at - ChronoDuration::seconds(EXPIRY_SKEW_SECS) > now,
            None => true,
        }
    }

    /// `Ok(None)` when nothing has been stored yet.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(FeedError::file(path, e)),
        };
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| FeedError::access(format!("unreadable credentials in {}: {e}", path.display())))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| FeedError::file(parent, e))?;
        }
        let text = serde_json::to_string_pretty(self).map_err(FeedError::access)?;
        write_private(path, text.as_bytes()).map_err(|e| FeedError::file(path, e))
    }
}

#[cfg(unix)]
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;
    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(contents)
}

#[cfg(not(unix))]
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    std::fs::write(path, contents)
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Callback {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

type CallbackSlot = Arc<std::sync::Mutex<Option<oneshot::Sender<Callback>>>>;

type Opener = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Clone)]
pub struct OAuthClient {
    settings: OAuthSettings,
    http: HttpsClient,
    opener: Opener,
    cached: Arc<Mutex<Option<StoredCredentials>>>,
}

impl OAuthClient {
    pub fn new(settings: OAuthSettings) -> Self {
        Self {
            settings,
            http: https_client(),
            opener: Arc::new(open_browser),
            cached: Arc::new(Mutex::new(None)),
        }
    }

    /// Replace how the consent URL is opened.
    pub fn with_opener(mut self, opener: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.opener = Arc::new(opener);
        self
    }

    pub fn settings(&self) -> &OAuthSettings {
        &self.settings
    }

    /// Run the browser flow and return the new credentials.
    pub async fn authorize(&self) -> std::result::Result<StoredCredentials, AuthError> {
        let fail = |msg: String| AuthError::Acquisition(msg);
        if self.settings.client_id.is_empty() {
            return Err(fail("no remote.oauth_client_id is configured".into()));
        }
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| fail(format!("cannot bind loopback listener: {e}")))?;
        let addr = listener
            .local_addr()
            .map_err(|e| fail(format!("loopback listener has no address: {e}")))?;
        let redirect_uri = format!("http://{addr}/");
        let state = login_state();

        let (tx, rx) = oneshot::channel();
        let slot: CallbackSlot = Arc::new(std::sync::Mutex::new(Some(tx)));
        let app = Router::new().route("/", get(receive_callback)).with_state(slot);
        let shutdown = CancellationToken::new();
        let server_stop = shutdown.clone();
        let server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { server_stop.cancelled().await })
                .await
        });

        let consent = self.consent_url(&redirect_uri, &state);
        tracing::info!(redirect = %redirect_uri, "opening browser for consent");
        (self.opener)(&consent);

        let callback = tokio::time::timeout(self.settings.login_timeout, rx).await;
        shutdown.cancel();
        if let Err(e) = server.await {
            tracing::debug!(error = %e, "loopback server task failed");
        }
        let callback = match callback {
            Ok(Ok(callback)) => callback,
            Ok(Err(_)) => return Err(fail("loopback server stopped before the redirect".into())),
            Err(_) => return Err(fail("timed out waiting for browser sign-in".into())),
        };
        if let Some(error) = callback.error {
            return Err(fail(format!("consent was refused: {error}")));
        }
        if callback.state.as_deref() != Some(state.as_str()) {
            return Err(fail("redirect carried an unexpected state".into()));
        }
        let Some(code) = callback.code else {
            return Err(fail("redirect carried no authorization code".into()));
        };

        let response = self
            .token_request(&[
                ("grant_type", "authorization_code"),
                ("code", &code),
                ("redirect_uri", &redirect_uri),
                ("client_id", &self.settings.client_id),
                ("client_secret", &self.settings.client_secret),
            ])
            .await
            .map_err(|e| fail(format!("code exchange failed: {e}")))?;
        Ok(StoredCredentials::from_response(response, None, Utc::now()))
    }

    fn consent_url(&self, redirect_uri: &str, state: &str) -> String {
        let scope = SCOPES.join(" ");
        let query = form_encode(&[
            ("client_id", &self.settings.client_id),
            ("redirect_uri", redirect_uri),
            ("response_type", "code"),
            ("scope", &scope),
            ("access_type", "offline"),
            ("prompt", "consent"),
            ("state", state),
        ]);
        let sep = if self.settings.auth_uri.contains('?') { '&' } else { '?' };
        format!("{}{sep}{query}", self.settings.auth_uri)
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> Result<TokenResponse> {
        let request = Request::builder()
            .method(Method::POST)
            .uri(&self.settings.token_uri)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(ACCEPT, "application/json")
            .body(Full::new(Bytes::from(form_encode(form))))
            .map_err(|e| FeedError::transport("token request", e))?;
        let response = self
            .http
            .request(request)
            .await
            .map_err(|e| FeedError::transport("token request", e))?;
        let response = check_status(response, "token request").await?;
        read_json(response, "token request").await
    }

    async fn refresh(&self, refresh_token: String) -> Result<StoredCredentials> {
        let response = self
            .token_request(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", &refresh_token),
                ("client_id", &self.settings.client_id),
                ("client_secret", &self.settings.client_secret),
            ])
            .await
            .map_err(|e| FeedError::access(format!("token refresh failed: {e}")))?;
        Ok(StoredCredentials::from_response(response, Some(refresh_token), Utc::now()))
    }

    fn store(&self, credentials: &StoredCredentials) {
        if let Err(e) = credentials.save(&self.settings.credentials_path) {
            tracing::warn!(error = %e, "could not persist credentials");
        }
    }
}

#[async_trait]
impl CredentialAcquirer for OAuthClient {
    fn describe(&self) -> &'static str {
        "browser oauth"
    }

    async fn acquire(&self) -> std::result::Result<(), AuthError> {
        let credentials = self.authorize().await?;
        self.store(&credentials);
        *self.cached.lock().await = Some(credentials);
        Ok(())
    }
}

#[async_trait]
impl TokenSource for OAuthClient {
    async fn token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;
        if cached.is_none() {
            *cached = StoredCredentials::load(&self.settings.credentials_path)?;
        }
        let Some(current) = cached.clone() else {
            return Err(FeedError::access("no stored credentials, sign-in required"));
        };
        if current.is_fresh(Utc::now()) {
            return Ok(current.access_token);
        }
        let Some(refresh_token) = current.refresh_token else {
            return Err(FeedError::access("stored credentials expired and have no refresh token"));
        };
        tracing::debug!("refreshing access token");
        let fresh = self.refresh(refresh_token).await?;
        self.store(&fresh);
        let token = fresh.access_token.clone();
        *cached = Some(fresh);
        Ok(token)
    }
}

async fn receive_callback(State(slot): State<CallbackSlot>, Query(callback): Query<Callback>) -> Html<&'static str> {
    let sender = slot.lock().ok().and_then(|mut slot| slot.take());
    if let Some(sender) = sender {
        let _ = sender.send(callback);
    }
    Html("<html><body><p>logtap is signed in. You can close this window.</p></body></html>")
}

/// Best-effort: the URL is also logged for copy and paste.
fn open_browser(url: &str) {
    tracing::info!(url, "open this URL to sign in");
    let mut command = if cfg!(target_os = "macos") {
        std::process::Command::new("open")
    } else if cfg!(windows) {
        let mut c = std::process::Command::new("cmd");
        c.args(["/C", "start", ""]);
        c
    } else {
        std::process::Command::new("xdg-open")
    };
    command
        .arg(url)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null());
    if let Err(e) = command.spawn() {
        tracing::warn!(error = %e, "could not launch a browser");
        eprintln!("Open this URL to sign in:\n{url}");
    }
}

/// Random value tying the redirect to this login attempt.
fn login_state() -> String {
    Uuid::new_v4().simple().to_string()
}

/// `application/x-www-form-urlencoded`, also valid as a URL query.
pub fn form_encode(pairs: &[(&str, &str)]) -> String {
    form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish()
}
