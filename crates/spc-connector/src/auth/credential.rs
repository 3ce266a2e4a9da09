use crate::error::AuthError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

/// A bearer token and the instant it stops being valid
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub value: String,
    pub expires_at: Instant,
}

impl AccessToken {
    pub fn new(value: impl Into<String>, expires_in: Duration) -> Self {
        Self {
            value: value.into(),
            expires_at: Instant::now() + expires_in,
        }
    }

    /// True while the token has more than `buffer` left before expiry
    pub fn is_fresh(&self, buffer: Duration) -> bool {
        Instant::now() + buffer < self.expires_at
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &"***")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Performs one credential exchange against an identity provider
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Provider name used in logs and errors
    fn provider(&self) -> &'static str;

    async fn fetch(&self) -> Result<AccessToken, AuthError>;
}

/// One lazily refreshed token.
///
/// The lock is not held across the exchange, so callers racing through an
/// expired window may each refresh. The last write wins.
pub struct CachedCredential {
    source: Arc<dyn TokenSource>,
    buffer: Duration,
    current: RwLock<Option<AccessToken>>,
}

impl CachedCredential {
    pub fn new(source: Arc<dyn TokenSource>, buffer: Duration) -> Self {
        Self {
            source,
            buffer,
            current: RwLock::new(None),
        }
    }

    pub async fn get(&self) -> Result<String, AuthError> {
        if let Some(token) = self.current.read().await.as_ref() {
            if token.is_fresh(self.buffer) {
                debug!(provider = self.source.provider(), "Using cached token");
                return Ok(token.value.clone());
            }
        }

        self.refresh().await
    }

    /// Exchange credentials and replace the cached token
    pub async fn refresh(&self) -> Result<String, AuthError> {
        debug!(provider = self.source.provider(), "Acquiring new token");
        let token = self.source.fetch().await?;
        let value = token.value.clone();
        *self.current.write().await = Some(token);
        Ok(value)
    }
}
