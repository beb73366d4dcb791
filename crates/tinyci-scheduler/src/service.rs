//! CI service - owns the queue and the lifecycle of its worker.

use std::sync::Arc;
use tinyci_core::{Build, BuildId, BuildRequest, BuildStatus, Notifier, StageRunner};
use tinyci_store::BuildRepo;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::{JobQueue, PipelineOrchestrator, SchedulerError, SchedulerResult, Worker};

enum WorkerState {
    Idle(Option<mpsc::UnboundedReceiver<Build>>),
    Running {
        shutdown: oneshot::Sender<()>,
        handle: JoinHandle<mpsc::UnboundedReceiver<Build>>,
    },
}

/// Entry point for queueing builds and running the background worker.
pub struct CiService {
    repo: Arc<dyn BuildRepo>,
    queue: JobQueue,
    orchestrator: Arc<PipelineOrchestrator>,
    worker: Mutex<WorkerState>,
}

impl CiService {
    pub fn new(
        repo: Arc<dyn BuildRepo>,
        runner: Arc<dyn StageRunner>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let (queue, receiver) = JobQueue::new(repo.clone());
        let orchestrator = Arc::new(PipelineOrchestrator::new(runner, repo.clone(), notifier));
        Self {
            repo,
            queue,
            orchestrator,
            worker: Mutex::new(WorkerState::Idle(Some(receiver))),
        }
    }

    pub fn repo(&self) -> &Arc<dyn BuildRepo> {
        &self.repo
    }

    /// Persist a new queued build and hand it to the worker.
    ///
    /// Returns as soon as the build is queued; builds queued while the worker
    /// is stopped wait until it is started again.
    pub async fn enqueue(&self, request: BuildRequest) -> SchedulerResult<BuildId> {
        self.queue.enqueue(request).await
    }

    /// Start the background worker. Calling this while it runs does nothing.
    pub async fn start(&self) -> SchedulerResult<()> {
        let mut state = self.worker.lock().await;
        let receiver = match &mut *state {
            WorkerState::Running { .. } => return Ok(()),
            WorkerState::Idle(receiver) => receiver.take().ok_or(SchedulerError::QueueClosed)?,
        };

        let (shutdown, shutdown_rx) = oneshot::channel();
        let worker = Worker::new(receiver, self.orchestrator.clone(), shutdown_rx);
        let handle = tokio::spawn(worker.run());
        *state = WorkerState::Running { shutdown, handle };
        info!("CI service started");
        Ok(())
    }

    /// Stop the worker after its current build and wait for it to exit.
    ///
    /// Builds that have not been picked up stay `QUEUED` and are processed
    /// once the service is started again.
    pub async fn stop(&self) {
        let mut state = self.worker.lock().await;
        if let WorkerState::Idle(_) = *state {
            return;
        }
        let WorkerState::Running { shutdown, handle } =
            std::mem::replace(&mut *state, WorkerState::Idle(None))
        else {
            return;
        };

        // The worker may already be gone if its queue closed.
        let _ = shutdown.send(());
        match handle.await {
            Ok(receiver) => *state = WorkerState::Idle(Some(receiver)),
            Err(e) => error!(error = %e, "Worker task failed"),
        }
        info!("CI service stopped");
    }

    /// Report builds left `QUEUED` or `RUNNING` by a previous process.
    ///
    /// Such builds are not resumed; they are only logged so that an operator
    /// can see them.
    pub async fn report_unfinished(&self) -> SchedulerResult<Vec<BuildId>> {
        let mut unfinished = Vec::new();
        for summary in self.repo.list().await? {
            let Some(build) = self.repo.find_by_id(summary.id).await? else {
                continue;
            };
            if matches!(build.status(), BuildStatus::Queued | BuildStatus::Running) {
                warn!(
                    build_id = %build.id(),
                    status = %build.status(),
                    "Build was not finished by a previous run and will not be resumed"
                );
                unfinished.push(build.id());
            }
        }
        Ok(unfinished)
    }
}
