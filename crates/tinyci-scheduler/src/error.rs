//! Scheduler error types.

use thiserror::Error;
use tinyci_store::StoreError;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("storage failure: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Domain(#[from] tinyci_core::Error),

    #[error("build queue is closed")]
    QueueClosed,
}

pub type SchedulerResult<T> = std::result::Result<T, SchedulerError>;
