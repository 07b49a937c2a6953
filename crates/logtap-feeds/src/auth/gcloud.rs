//! Credentials through the `gcloud` CLI.

use super::{AuthError, CredentialAcquirer, TokenSource};
use async_trait::async_trait;
use logtap_core::{FeedError, Result};
use std::ffi::OsString;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::sync::Mutex;

/// Application-default tokens live for an hour; re-ask well before that.
const TOKEN_REUSE: Duration = Duration::from_secs(45 * 60);

/// The `gcloud` CLI as both login and token source.
///
/// Tokens from `print-access-token` are cached. A successful login or an
/// [`invalidate`](TokenSource::invalidate) drops the cached token, so the
/// next request asks `gcloud` again.
#[derive(Clone)]
pub struct Gcloud {
    program: OsString,
    leading: Vec<OsString>,
    cached: Arc<Mutex<Option<(String, Instant)>>>,
}

impl Gcloud {
    pub fn new() -> Self {
        Self::with_program("gcloud")
    }

    /// Use another executable in place of `gcloud`.
    pub fn with_program(program: impl Into<OsString>) -> Self {
        Self::with_command(program, Vec::<OsString>::new())
    }

    /// Run `program leading.. <gcloud args>` in place of `gcloud`.
    pub fn with_command<I, A>(program: impl Into<OsString>, leading: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<OsString>,
    {
        Self {
            program: program.into(),
            leading: leading.into_iter().map(Into::into).collect(),
            cached: Arc::new(Mutex::new(None)),
        }
    }

    fn command(&self, action: &str) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.leading)
            .args(["auth", "application-default", action])
            .stdin(Stdio::null());
        command
    }

    fn program_name(&self) -> std::borrow::Cow<'_, str> {
        self.program.to_string_lossy()
    }
}

impl Default for Gcloud {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialAcquirer for Gcloud {
    fn describe(&self) -> &'static str {
        "gcloud login"
    }

    async fn acquire(&self) -> std::result::Result<(), AuthError> {
        let output = self
            .command("login")
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| AuthError::Acquisition(format!("cannot run {}: {e}", self.program_name())))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AuthError::Acquisition(format!(
                "gcloud login exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        *self.cached.lock().await = None;
        tracing::debug!("gcloud login finished, cached token dropped");
        Ok(())
    }
}

#[async_trait]
impl TokenSource for Gcloud {
    async fn token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;
        if let Some((token, at)) = cached.as_ref() {
            if at.elapsed() < TOKEN_REUSE {
                return Ok(token.clone());
            }
        }
        let output = self
            .command("print-access-token")
            .output()
            .await
            .map_err(|e| FeedError::access(format!("cannot run {}: {e}", self.program_name())))?;
        if !output.status.success() {
            return Err(FeedError::access(format!(
                "gcloud has no application-default credentials: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if token.is_empty() {
            return Err(FeedError::access("gcloud printed an empty access token"));
        }
        *cached = Some((token.clone(), Instant::now()));
        Ok(token)
    }

    async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }
}
