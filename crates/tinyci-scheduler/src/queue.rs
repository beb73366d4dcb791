//! In-memory build queue.

use std::sync::Arc;
use tinyci_core::{Build, BuildId, BuildRequest};
use tinyci_store::BuildRepo;
use tokio::sync::mpsc;
use tracing::info;

use crate::{SchedulerError, SchedulerResult};

/// Producer side of the build queue.
///
/// Enqueueing persists the new build before handing it to the worker, so it
/// is visible to readers while it waits. It never waits for the worker.
#[derive(Clone)]
pub struct JobQueue {
    repo: Arc<dyn BuildRepo>,
    sender: mpsc::UnboundedSender<Build>,
}

impl JobQueue {
    /// Create a queue and the receiver the worker consumes.
    pub fn new(repo: Arc<dyn BuildRepo>) -> (Self, mpsc::UnboundedReceiver<Build>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { repo, sender }, receiver)
    }

    /// Create a build for `request`, persist it as queued and queue it.
    pub async fn enqueue(&self, request: BuildRequest) -> SchedulerResult<BuildId> {
        let build = Build::from_request(request);
        let id = build.id();

        self.repo.save(&build).await?;
        self.sender
            .send(build)
            .map_err(|_| SchedulerError::QueueClosed)?;

        info!(build_id = %id, "Queued build");
        Ok(id)
    }
}
