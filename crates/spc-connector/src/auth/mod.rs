//! Bearer tokens for the source and destination APIs
//!
//! [`TokenCache`] holds one [`CachedCredential`] per provider. Each credential
//! hands out its cached token until the token comes within an expiry buffer of
//! its deadline, then exchanges client credentials for a new one.

mod credential;
mod oauth;

pub use credential::{AccessToken, CachedCredential, TokenSource};
pub use oauth::{GraphTokenSource, ZitadelTokenSource};

use crate::config::Config;
use crate::error::AuthError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Graph tokens are refreshed once they are within 15 minutes of expiry.
pub const GRAPH_TOKEN_EXPIRY_BUFFER: Duration = Duration::from_secs(15 * 60);

/// Destination tokens are refreshed once they are within 5 minutes of expiry.
pub const UNIQUE_TOKEN_EXPIRY_BUFFER: Duration = Duration::from_secs(5 * 60);

/// Access to the two bearer tokens every pipeline run needs
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Token for the source document library API (Microsoft Graph)
    async fn source_token(&self) -> Result<String, AuthError>;

    /// Token for the destination ingestion API
    async fn destination_token(&self) -> Result<String, AuthError>;
}

pub struct TokenCache {
    graph: CachedCredential,
    unique: CachedCredential,
}

impl TokenCache {
    pub fn new(graph: CachedCredential, unique: CachedCredential) -> Self {
        Self { graph, unique }
    }

    /// Token cache backed by the configured identity providers
    pub fn from_config(config: &Config, http: reqwest::Client) -> Self {
        let graph = GraphTokenSource::new(http.clone(), &config.graph);
        let unique = ZitadelTokenSource::new(http, &config.zitadel);

        Self::new(
            CachedCredential::new(Arc::new(graph), GRAPH_TOKEN_EXPIRY_BUFFER),
            CachedCredential::new(Arc::new(unique), UNIQUE_TOKEN_EXPIRY_BUFFER),
        )
    }
}

#[async_trait]
impl TokenProvider for TokenCache {
    async fn source_token(&self) -> Result<String, AuthError> {
        self.graph.get().await
    }

    async fn destination_token(&self) -> Result<String, AuthError> {
        self.unique.get().await
    }
}
