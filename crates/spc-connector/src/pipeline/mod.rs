//! Ingestion pipeline
//!
//! [`PipelineExecutor::process_item`] runs the fixed list of steps for one
//! discovered file:
//!
//! 1. token validation
//! 2. content fetching
//! 3. content registration
//! 4. storage upload
//! 5. ingestion finalization
//!
//! Steps run strictly in order, each under a timeout. The first failure ends
//! the run. Retrying a failed run is left to the job queue.

pub mod context;
mod error;
mod executor;
mod step;
pub mod steps;

pub use context::ProcessingContext;
pub use error::{ErrorKind, PipelineError};
pub use executor::{PipelineExecutor, PipelineResult};
pub use step::{PipelineStep, Step, StepName};
