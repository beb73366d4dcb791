//! Pipeline orchestrator - drives one build through clone, build and test.

use std::sync::Arc;
use tinyci_core::{
    Build, BuildId, BuildStatus, CommitState, CommitStatus, Notifier, Stage, StageRunner,
};
use tinyci_store::{BuildRepo, StoreResult};
use tokio::sync::mpsc;
use tracing::{Instrument, info, info_span, warn};

use crate::SchedulerResult;

/// Lines buffered between a running process and the log writer.
const LINE_BUFFER: usize = 256;

/// Result of one attempted stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageOutcome {
    pub stage: Stage,
    pub success: bool,
}

impl StageOutcome {
    /// Human readable result line, e.g. `Clone: Success`.
    pub fn summary_line(&self) -> String {
        let result = if self.success { "Success" } else { "Fail" };
        format!("{}: {}", self.stage, result)
    }
}

/// Result of a pipeline execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineResult {
    pub build_id: BuildId,
    pub status: BuildStatus,
    /// Attempted stages in order; stages after a failure are absent.
    pub stages: Vec<StageOutcome>,
}

impl PipelineResult {
    pub fn success(&self) -> bool {
        self.status == BuildStatus::Success
    }

    /// Stage result lines joined by newlines.
    pub fn description(&self) -> String {
        self.stages
            .iter()
            .map(StageOutcome::summary_line)
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn commit_state(&self) -> CommitState {
        if self.success() {
            CommitState::Success
        } else {
            CommitState::Failure
        }
    }
}

/// Executes the fixed pipeline for a build and records its progress.
pub struct PipelineOrchestrator {
    runner: Arc<dyn StageRunner>,
    repo: Arc<dyn BuildRepo>,
    notifier: Arc<dyn Notifier>,
}

impl PipelineOrchestrator {
    pub fn new(
        runner: Arc<dyn StageRunner>,
        repo: Arc<dyn BuildRepo>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            runner,
            repo,
            notifier,
        }
    }

    /// Run `build` to a terminal status.
    ///
    /// Stage failures end the pipeline early and mark the build failed; they
    /// are not errors. An `Err` means the store could not record progress, in
    /// which case the build may be left `RUNNING` on disk. The workspace is
    /// cleaned up whenever a stage was attempted.
    pub async fn process(&self, build: Build) -> SchedulerResult<PipelineResult> {
        let span = info_span!("build", build_id = %build.id(), commit = %build.commit_sha());
        self.process_inner(build).instrument(span).await
    }

    async fn process_inner(&self, mut build: Build) -> SchedulerResult<PipelineResult> {
        build.start()?;
        self.repo.save(&build).await?;
        info!("Build started");

        let stages = self.run_stages(&build).await;
        self.runner.cleanup(&build).await;
        let stages = stages?;

        if stages.iter().all(|s| s.success) {
            build.succeed()?;
        } else {
            build.fail()?;
        }
        self.repo.save(&build).await?;

        let result = PipelineResult {
            build_id: build.id(),
            status: build.status(),
            stages,
        };
        info!(status = %result.status, "Build finished");

        let status = CommitStatus {
            owner: build.repo_owner().to_string(),
            repo: build.repo_name().to_string(),
            commit_sha: build.commit_sha().to_string(),
            state: result.commit_state(),
            description: result.description(),
        };
        if let Err(e) = self.notifier.notify(&status).await {
            warn!(error = %e, "Failed to publish commit status");
        }

        Ok(result)
    }

    /// Run stages in order until one fails.
    async fn run_stages(&self, build: &Build) -> StoreResult<Vec<StageOutcome>> {
        let mut outcomes = Vec::with_capacity(Stage::ALL.len());
        for stage in Stage::ALL {
            let success = self.run_stage(stage, build).await?;
            let outcome = StageOutcome { stage, success };
            self.append(build.id(), &outcome.summary_line()).await?;
            info!(stage = %stage, success, "Stage completed");
            outcomes.push(outcome);
            if !success {
                break;
            }
        }
        Ok(outcomes)
    }

    /// Run one stage while its output is written to the build log.
    async fn run_stage(&self, stage: Stage, build: &Build) -> StoreResult<bool> {
        let (tx, mut rx) = mpsc::channel::<String>(LINE_BUFFER);
        let id = build.id();

        let drain = async {
            let mut result = Ok(());
            while let Some(line) = rx.recv().await {
                // After a store failure keep receiving so the runner never
                // blocks on a full channel; the error is reported at the end.
                if result.is_ok() {
                    result = self.append(id, &line).await;
                }
            }
            result
        };

        let (success, drained) = tokio::join!(self.runner.run_stage(stage, build, tx), drain);
        drained?;
        Ok(success)
    }

    async fn append(&self, id: BuildId, line: &str) -> StoreResult<()> {
        if !self.repo.append_to_log(id, line).await? {
            warn!(build_id = %id, "Build directory missing, log line dropped");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SchedulerError;
    use crate::test_support::{MockRunner, RecordingNotifier, RunnerCall};
    use async_trait::async_trait;
    use tempfile::TempDir;
    use tinyci_core::{BuildSummary, LogFile, LogSlice};
    use tinyci_store::{FileBuildRepo, StoreError};

    struct Harness {
        _dir: TempDir,
        repo: Arc<FileBuildRepo>,
        runner: Arc<MockRunner>,
        notifier: Arc<RecordingNotifier>,
        orchestrator: PipelineOrchestrator,
    }

    async fn harness(runner: MockRunner, notifier: RecordingNotifier) -> Harness {
        let dir = TempDir::new().unwrap();
        let repo = Arc::new(FileBuildRepo::open(dir.path()).await.unwrap());
        let runner = Arc::new(runner);
        let notifier = Arc::new(notifier);
        let orchestrator = PipelineOrchestrator::new(runner.clone(), repo.clone(), notifier.clone());
        Harness {
            _dir: dir,
            repo,
            runner,
            notifier,
            orchestrator,
        }
    }

    async fn queued_build(repo: &FileBuildRepo) -> Build {
        let build = Build::new("abc123", "https://github.com/octo/widgets.git", "octo", "widgets");
        repo.save(&build).await.unwrap();
        build
    }

    #[tokio::test]
    async fn test_all_stages_succeed() {
        let h = harness(MockRunner::succeeding(), RecordingNotifier::default()).await;
        let build = queued_build(&h.repo).await;
        let id = build.id();

        let result = h.orchestrator.process(build).await.unwrap();

        assert_eq!(result.status, BuildStatus::Success);
        assert_eq!(h.runner.stages_for(id), Stage::ALL.to_vec());
        assert_eq!(h.runner.calls().last(), Some(&RunnerCall::Cleanup(id)));

        let stored = h.repo.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(stored.status(), BuildStatus::Success);
        assert!(stored.started_at().is_some());
        assert!(stored.finished_at().is_some());

        let sent = h.notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].state, CommitState::Success);
        assert_eq!(sent[0].owner, "octo");
        assert_eq!(sent[0].repo, "widgets");
        assert_eq!(sent[0].commit_sha, "abc123");
        assert_eq!(
            sent[0].description,
            "Clone: Success\nBuild: Success\nTest: Success"
        );
    }

    #[tokio::test]
    async fn test_clone_failure_skips_build_and_test() {
        let h = harness(MockRunner::failing_at(Stage::Clone), RecordingNotifier::default()).await;
        let build = queued_build(&h.repo).await;
        let id = build.id();

        let result = h.orchestrator.process(build).await.unwrap();

        assert_eq!(result.status, BuildStatus::Failed);
        assert_eq!(
            h.runner.calls(),
            vec![RunnerCall::Stage(id, Stage::Clone), RunnerCall::Cleanup(id)]
        );
        let sent = h.notifier.sent();
        assert_eq!(sent[0].state, CommitState::Failure);
        assert_eq!(sent[0].description, "Clone: Fail");
    }

    #[tokio::test]
    async fn test_build_failure_skips_test() {
        let h = harness(MockRunner::failing_at(Stage::Build), RecordingNotifier::default()).await;
        let build = queued_build(&h.repo).await;
        let id = build.id();

        let result = h.orchestrator.process(build).await.unwrap();

        assert_eq!(result.status, BuildStatus::Failed);
        assert_eq!(h.runner.stages_for(id), vec![Stage::Clone, Stage::Build]);
        assert_eq!(result.description(), "Clone: Success\nBuild: Fail");
    }

    #[tokio::test]
    async fn test_test_failure_fails_build() {
        let h = harness(MockRunner::failing_at(Stage::Test), RecordingNotifier::default()).await;
        let build = queued_build(&h.repo).await;
        let id = build.id();

        h.orchestrator.process(build).await.unwrap();

        let stored = h.repo.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(stored.status(), BuildStatus::Failed);
        let sent = h.notifier.sent();
        assert_eq!(sent[0].state, CommitState::Failure);
        assert_eq!(
            sent[0].description,
            "Clone: Success\nBuild: Success\nTest: Fail"
        );
    }

    #[tokio::test]
    async fn test_stage_output_is_logged_in_order() {
        let h = harness(MockRunner::failing_at(Stage::Build), RecordingNotifier::default()).await;
        let build = queued_build(&h.repo).await;
        let id = build.id();

        h.orchestrator.process(build).await.unwrap();

        let log = h.repo.get_log(id).await.unwrap().unwrap();
        assert_eq!(
            log.content,
            "clone output 1\nclone output 2\nClone: Success\n\
             build output 1\nbuild output 2\nBuild: Fail\n"
        );
    }

    #[tokio::test]
    async fn test_notifier_failure_does_not_change_status() {
        let h = harness(MockRunner::succeeding(), RecordingNotifier::failing()).await;
        let build = queued_build(&h.repo).await;
        let id = build.id();

        let result = h.orchestrator.process(build).await.unwrap();

        assert!(result.success());
        assert_eq!(h.notifier.sent().len(), 1);
        let stored = h.repo.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(stored.status(), BuildStatus::Success);
    }

    #[tokio::test]
    async fn test_already_started_build_is_rejected() {
        let h = harness(MockRunner::succeeding(), RecordingNotifier::default()).await;
        let mut build = queued_build(&h.repo).await;
        build.start().unwrap();

        let err = h.orchestrator.process(build).await.unwrap_err();

        assert!(matches!(err, SchedulerError::Domain(_)));
        assert!(h.runner.calls().is_empty());
        assert!(h.notifier.sent().is_empty());
    }

    /// Store whose log writes always fail.
    struct BrokenLogRepo {
        inner: Arc<FileBuildRepo>,
    }

    #[async_trait]
    impl BuildRepo for BrokenLogRepo {
        async fn save(&self, build: &Build) -> StoreResult<()> {
            self.inner.save(build).await
        }

        async fn append_to_log(&self, _id: BuildId, _chunk: &str) -> StoreResult<bool> {
            Err(StoreError::Io {
                path: "build.log".into(),
                source: std::io::Error::other("disk full"),
            })
        }

        async fn list(&self) -> StoreResult<Vec<BuildSummary>> {
            self.inner.list().await
        }

        async fn find_by_id(&self, id: BuildId) -> StoreResult<Option<Build>> {
            self.inner.find_by_id(id).await
        }

        async fn get_log(&self, id: BuildId) -> StoreResult<Option<LogFile>> {
            self.inner.get_log(id).await
        }

        async fn get_log_slice(&self, id: BuildId, offset: u64) -> StoreResult<Option<LogSlice>> {
            self.inner.get_log_slice(id, offset).await
        }
    }

    #[tokio::test]
    async fn test_storage_failure_aborts_but_cleans_up() {
        let dir = TempDir::new().unwrap();
        let inner = Arc::new(FileBuildRepo::open(dir.path()).await.unwrap());
        let runner = Arc::new(MockRunner::succeeding());
        let notifier = Arc::new(RecordingNotifier::default());
        let orchestrator = PipelineOrchestrator::new(
            runner.clone(),
            Arc::new(BrokenLogRepo {
                inner: inner.clone(),
            }),
            notifier.clone(),
        );
        let build = queued_build(&inner).await;
        let id = build.id();

        let err = orchestrator.process(build).await.unwrap_err();

        assert!(matches!(err, SchedulerError::Store(_)));
        assert_eq!(runner.calls().last(), Some(&RunnerCall::Cleanup(id)));
        assert!(notifier.sent().is_empty());
        let stored = inner.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(stored.status(), BuildStatus::Running);
    }

    #[test]
    fn test_summary_lines() {
        let ok = StageOutcome {
            stage: Stage::Clone,
            success: true,
        };
        let failed = StageOutcome {
            stage: Stage::Test,
            success: false,
        };

        assert_eq!(ok.summary_line(), "Clone: Success");
        assert_eq!(failed.summary_line(), "Test: Fail");
    }
}
