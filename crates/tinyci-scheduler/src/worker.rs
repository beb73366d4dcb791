//! Worker that processes builds from the queue.

use std::sync::Arc;
use tinyci_core::Build;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info};

use crate::PipelineOrchestrator;

/// Single consumer of the build queue.
///
/// Builds are processed strictly one at a time in the order they were queued.
pub struct Worker {
    receiver: mpsc::UnboundedReceiver<Build>,
    orchestrator: Arc<PipelineOrchestrator>,
    shutdown: oneshot::Receiver<()>,
}

impl Worker {
    pub fn new(
        receiver: mpsc::UnboundedReceiver<Build>,
        orchestrator: Arc<PipelineOrchestrator>,
        shutdown: oneshot::Receiver<()>,
    ) -> Self {
        Self {
            receiver,
            orchestrator,
            shutdown,
        }
    }

    /// Run the worker loop until shutdown is signalled or every queue handle is dropped.
    ///
    /// Shutdown is only observed between builds; a running build is finished
    /// first. Builds still waiting are left in the queue, and the receiver is
    /// handed back so a later worker can continue with them.
    pub async fn run(mut self) -> mpsc::UnboundedReceiver<Build> {
        info!("Starting worker");

        loop {
            let build = tokio::select! {
                biased;
                _ = &mut self.shutdown => {
                    info!("Worker shutting down");
                    break;
                }
                next = self.receiver.recv() => match next {
                    Some(build) => build,
                    None => {
                        info!("Build queue closed, worker exiting");
                        break;
                    }
                },
            };

            let id = build.id();
            if let Err(e) = self.orchestrator.process(build).await {
                error!(build_id = %id, error = %e, "Build aborted");
            }
        }

        self.receiver
    }
}
