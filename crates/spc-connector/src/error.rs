//! Error types shared across the connector
//!
//! Each concern gets its own enum. Pipeline failures have their own type in
//! [`crate::pipeline::PipelineError`] because they carry a retry
//! classification.

use thiserror::Error;

/// Invalid or missing configuration. Fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required setting {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

impl ConfigError {
    pub fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            name,
            reason: reason.into(),
        }
    }
}

/// Credential exchange failures
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Token request to {provider} failed: {source}")]
    Http {
        provider: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("Token endpoint of {provider} returned status {status}: {body}")]
    Rejected {
        provider: &'static str,
        status: u16,
        body: String,
    },

    #[error("Token response of {provider} did not contain an access token")]
    MissingToken { provider: &'static str },
}

/// Backing-store failures of the distributed lock.
///
/// These never leave the lock API; callers only ever see a negative result.
#[derive(Debug, Error)]
pub enum LockError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Lock backend unavailable: {0}")]
    Unavailable(String),
}

/// Job queue failures
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Failed to encode job payload: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("Job {0} not found")]
    NotFound(uuid::Uuid),
}

/// Source document library API failures
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Graph API returned status {status} for {url}")]
    Status { status: u16, url: String },

    #[error("Invalid Graph API response: {0}")]
    InvalidResponse(String),
}

/// Destination ingestion API failures
#[derive(Debug, Error)]
pub enum DestinationError {
    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Destination API returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Upload failed with status {status}: {reason}")]
    Upload { status: u16, reason: String },

    #[error("Invalid response from destination API {operation}: {reason}")]
    InvalidResponse {
        operation: &'static str,
        reason: String,
    },
}

impl DestinationError {
    pub fn invalid(operation: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidResponse {
            operation,
            reason: reason.into(),
        }
    }
}

/// Failure of a whole scan cycle
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Failed to obtain destination token: {0}")]
    Auth(#[from] AuthError),

    #[error("File diff failed: {0}")]
    Diff(#[from] DestinationError),

    #[error("All {failed} configured sites failed to scan")]
    AllSitesFailed { failed: usize },
}
