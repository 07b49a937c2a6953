//! Bearer token sources.

use super::{AuthError, CredentialAcquirer};
use async_trait::async_trait;
use logtap_core::{FeedError, Result};

/// Supplies the bearer token attached to every API request.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// A currently valid token, or [`FeedError::Access`] if none is available.
    async fn token(&self) -> Result<String>;

    /// The last token was rejected; do not hand it out again.
    async fn invalidate(&self) {}
}

/// A token fixed for the whole run, e.g. from `LOGTAP_ACCESS_TOKEN`.
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl TokenSource for StaticToken {
    async fn token(&self) -> Result<String> {
        if self.0.is_empty() {
            return Err(FeedError::access("empty access token"));
        }
        Ok(self.0.clone())
    }
}

#[async_trait]
impl CredentialAcquirer for StaticToken {
    fn describe(&self) -> &'static str {
        "fixed access token"
    }

    async fn acquire(&self) -> std::result::Result<(), AuthError> {
        Err(AuthError::Acquisition(format!(
            "the token in {} was rejected; unset it or provide a valid one",
            super::ACCESS_TOKEN_ENV
        )))
    }
}
