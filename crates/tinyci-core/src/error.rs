//! Error types for tinyci.

use thiserror::Error;

use crate::BuildStatus;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: BuildStatus, to: BuildStatus },
}

pub type Result<T> = std::result::Result<T, Error>;
