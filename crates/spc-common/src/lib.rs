//! SPC Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared plumbing for the SharePoint connector workspace.
//!
//! - **Logging**: subscriber setup driven by `LOG_*` environment variables
//! - **Correlation**: identifiers threaded through scan and job log lines
//! - **Shutdown**: the process-wide termination signal future
//!
//! # Example
//!
//! ```no_run
//! use spc_common::logging::{init_logging, LogConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let _guard = init_logging(&LogConfig::from_env()?)?;
//!     tracing::info!("connector starting");
//!     Ok(())
//! }
//! ```

pub mod correlation;
pub mod logging;
pub mod shutdown;

pub use correlation::CorrelationId;
pub use logging::{init_logging, LogConfig, LoggingGuard};
pub use shutdown::shutdown_signal;
