//! Authentication gate for the remote source.
//!
//! Before a remote reader starts, [`AuthGate::verify`] probes the API with a
//! cheap read-only call. If the probe is rejected, credentials are acquired
//! interactively while an [`AuthIndicator`] keeps the user informed. Which
//! acquisition runs depends on the [`AuthEnvironment`]:
//!
//! | environment               | acquisition                              |
//! |---------------------------|------------------------------------------|
//! | `gcloud` available        | `gcloud auth application-default login`  |
//! | otherwise                 | browser OAuth with a loopback redirect   |
//! | `LOGTAP_ACCESS_TOKEN` set | none: a rejected fixed token is fatal    |

pub mod gcloud;
pub mod oauth;
pub mod token;

pub use gcloud::Gcloud;
pub use oauth::{OAuthClient, OAuthSettings, StoredCredentials};
pub use token::{StaticToken, TokenSource};

use crate::remote::{project_resource, LoggingApi};
use async_trait::async_trait;
use futures::future::BoxFuture;
use logtap_core::config::RemoteConfig;
use logtap_core::FeedError;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

pub const ACCESS_TOKEN_ENV: &str = "LOGTAP_ACCESS_TOKEN";
pub const USE_GCLOUD_ENV: &str = "LOGTAP_USE_GCLOUD";

/// Shown while credentials are being acquired.
pub const AUTH_MESSAGE: &str = "Authenticating with gcloud...\nRedirecting to your browser.";

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("credential acquisition failed: {0}")]
    Acquisition(String),

    #[error("auth indicator failed: {0}")]
    Indicator(String),
}

/// Facts about the machine that decide how credentials are obtained.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthEnvironment {
    pub uses_gcloud: bool,
    /// A fixed bearer token supplied by the user.
    pub access_token: Option<String>,
}

impl AuthEnvironment {
    /// Read the environment. `LOGTAP_USE_GCLOUD` overrides the PATH lookup.
    pub fn detect() -> Self {
        let uses_gcloud = match std::env::var(USE_GCLOUD_ENV) {
            Ok(flag) => matches!(flag.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"),
            Err(_) => binary_on_path("gcloud"),
        };
        let access_token = std::env::var(ACCESS_TOKEN_ENV)
            .ok()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        Self {
            uses_gcloud,
            access_token,
        }
    }
}

fn binary_on_path(name: &str) -> bool {
    let Some(paths) = std::env::var_os("PATH") else {
        return false;
    };
    std::env::split_paths(&paths).any(|dir| is_executable(&dir.join(name)))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    ["exe", "cmd", "bat"]
        .iter()
        .any(|ext| path.with_extension(ext).is_file())
}

/// Something that can obtain fresh credentials, typically interactively.
#[async_trait]
pub trait CredentialAcquirer: Send + Sync {
    fn describe(&self) -> &'static str;

    async fn acquire(&self) -> Result<(), AuthError>;
}

/// Keeps the user informed while credentials are acquired.
#[async_trait]
pub trait AuthIndicator: Send {
    /// Show `message` until `acquisition` completes and return its outcome.
    async fn block_on(
        &mut self,
        message: &str,
        acquisition: BoxFuture<'_, Result<(), AuthError>>,
    ) -> Result<(), AuthError>;
}

/// Indicator for non-interactive runs: writes the message to the log.
#[derive(Debug, Default)]
pub struct LogIndicator;

#[async_trait]
impl AuthIndicator for LogIndicator {
    async fn block_on(
        &mut self,
        message: &str,
        acquisition: BoxFuture<'_, Result<(), AuthError>>,
    ) -> Result<(), AuthError> {
        tracing::info!(message, "waiting for credentials");
        eprintln!("{message}");
        acquisition.await
    }
}

/// How [`AuthGate::verify`] got through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    /// The probe succeeded with existing credentials.
    Authorized,
    /// The probe failed and new credentials were acquired.
    Acquired,
}

/// Token source and acquirer matching one [`AuthEnvironment`].
#[derive(Clone)]
pub struct Credentials {
    pub tokens: Arc<dyn TokenSource>,
    pub acquirer: Arc<dyn CredentialAcquirer>,
}

impl Credentials {
    pub fn for_environment(env: &AuthEnvironment, remote: &RemoteConfig) -> Self {
        if let Some(token) = &env.access_token {
            let fixed = Arc::new(StaticToken::new(token.clone()));
            return Self {
                tokens: fixed.clone(),
                acquirer: fixed,
            };
        }
        if env.uses_gcloud {
            let gcloud = Arc::new(Gcloud::new());
            return Self {
                tokens: gcloud.clone(),
                acquirer: gcloud,
            };
        }
        let oauth = Arc::new(OAuthClient::new(OAuthSettings::from_config(remote)));
        Self {
            tokens: oauth.clone(),
            acquirer: oauth,
        }
    }
}

pub struct AuthGate {
    api: Arc<dyn LoggingApi>,
    acquirer: Arc<dyn CredentialAcquirer>,
}

impl AuthGate {
    pub fn new(api: Arc<dyn LoggingApi>, acquirer: Arc<dyn CredentialAcquirer>) -> Self {
        Self { api, acquirer }
    }

    /// One cheap read-only call against the project.
    pub async fn probe(&self, project: &str) -> Result<(), FeedError> {
        self.api
            .list_logs(&project_resource(project), 1)
            .await
            .map(|_| ())
    }

    /// Probe, and acquire credentials behind `indicator` if the probe fails.
    ///
    /// An acquisition failure is returned as is; callers treat it as fatal.
    pub async fn verify(
        &self,
        project: &str,
        indicator: &mut dyn AuthIndicator,
    ) -> Result<GateOutcome, AuthError> {
        match self.probe(project).await {
            Ok(()) => {
                tracing::debug!(project, "access probe passed");
                Ok(GateOutcome::Authorized)
            }
            Err(err) => {
                tracing::warn!(project, error = %err, via = self.acquirer.describe(), "access probe failed, acquiring credentials");
                indicator
                    .block_on(AUTH_MESSAGE, self.acquirer.acquire())
                    .await?;
                tracing::info!(via = self.acquirer.describe(), "credentials acquired");
                Ok(GateOutcome::Acquired)
            }
        }
    }
}
