//! Commit status notification.

use async_trait::async_trait;
use derive_more::Display;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Final state reported for a commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
pub enum CommitState {
    #[display("success")]
    Success,
    #[display("failure")]
    Failure,
}

/// Outcome of a finished build, addressed to a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitStatus {
    pub owner: String,
    pub repo: String,
    pub commit_sha: String,
    pub state: CommitState,
    pub description: String,
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("status API returned {status}: {message}")]
    Api { status: u16, message: String },
}

/// Reports build outcomes to an external commit status API.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, status: &CommitStatus) -> Result<(), NotifyError>;
}
