//! Build scheduling for tinyci.
//!
//! Builds are queued in memory and executed one at a time, in arrival order,
//! by a single worker task.

pub mod error;
pub mod orchestrator;
pub mod queue;
pub mod service;
pub mod worker;

#[cfg(test)]
mod test_support;

pub use error::{SchedulerError, SchedulerResult};
pub use orchestrator::{PipelineOrchestrator, PipelineResult, StageOutcome};
pub use queue::JobQueue;
pub use service::CiService;
pub use worker::Worker;
