//! SharePoint Connector Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Keeps a destination ingestion store in sync with flagged SharePoint files.
//!
//! # Overview
//!
//! - **Scanning**: every interval one instance, elected through a distributed
//!   lock, lists the flagged files of each configured site and asks the
//!   destination which of them are new or changed
//! - **Queue**: changed files become jobs in a Postgres-backed queue
//! - **Pipeline**: workers run each job through five steps (token validation,
//!   content fetching, content registration, storage upload, ingestion
//!   finalization) with a per-step timeout
//! - **Tokens**: bearer tokens for both APIs are cached until shortly before
//!   they expire
//! - **Observability**: Prometheus metrics and health probes on one HTTP port
//!
//! # Modules
//!
//! - [`auth`]: client-credential token exchange and caching
//! - [`clients`]: Microsoft Graph and destination API clients
//! - [`config`]: environment configuration
//! - [`lock`]: distributed lock over a shared store
//! - [`pipeline`]: the processing steps and their executor
//! - [`queue`]: job queue backends and the worker
//! - [`scanner`] and [`scheduler`]: periodic discovery
//! - [`health`] and [`metrics`]: the HTTP surface

pub mod auth;
pub mod clients;
pub mod config;
pub mod error;
pub mod health;
pub mod lock;
pub mod metrics;
pub mod pipeline;
pub mod queue;
pub mod scanner;
pub mod scheduler;

#[cfg(test)]
mod test_support;

pub use config::Config;
pub use error::{AuthError, ConfigError, DestinationError, LockError, QueueError, ScanError, SourceError};
