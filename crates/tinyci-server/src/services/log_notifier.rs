//! Notifier that only writes build outcomes to the tracing log.

use async_trait::async_trait;
use tinyci_core::{CommitStatus, Notifier, NotifyError};
use tracing::info;

/// Used when no status API credentials are configured.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, status: &CommitStatus) -> Result<(), NotifyError> {
        info!(
            owner = %status.owner,
            repo = %status.repo,
            sha = %status.commit_sha,
            state = %status.state,
            description = %status.description,
            "Commit status"
        );
        Ok(())
    }
}
