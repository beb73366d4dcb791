//! Test doubles shared by the scheduler tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tinyci_core::{
    Build, BuildId, BuildRequest, CommitStatus, LineSender, Notifier, NotifyError, Stage,
    StageRunner,
};

/// A call observed by [`MockRunner`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunnerCall {
    Stage(BuildId, Stage),
    Cleanup(BuildId),
}

/// Stage runner that emits two lines per stage and returns scripted results.
#[derive(Default)]
pub struct MockRunner {
    results: HashMap<Stage, bool>,
    calls: Mutex<Vec<RunnerCall>>,
}

impl MockRunner {
    pub fn succeeding() -> Self {
        Self::default()
    }

    pub fn failing_at(stage: Stage) -> Self {
        let mut runner = Self::default();
        runner.results.insert(stage, false);
        runner
    }

    pub fn calls(&self) -> Vec<RunnerCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn stages_for(&self, id: BuildId) -> Vec<Stage> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                RunnerCall::Stage(build_id, stage) if build_id == id => Some(stage),
                _ => None,
            })
            .collect()
    }

    async fn run(&self, stage: Stage, build: &Build, lines: LineSender) -> bool {
        self.calls
            .lock()
            .unwrap()
            .push(RunnerCall::Stage(build.id(), stage));
        let name = stage.to_string().to_lowercase();
        lines.send(format!("{} output 1", name)).await.unwrap();
        lines.send(format!("{} output 2", name)).await.unwrap();
        self.results.get(&stage).copied().unwrap_or(true)
    }
}

#[async_trait]
impl StageRunner for MockRunner {
    async fn clone_repo(&self, build: &Build, lines: LineSender) -> bool {
        self.run(Stage::Clone, build, lines).await
    }

    async fn build(&self, build: &Build, lines: LineSender) -> bool {
        self.run(Stage::Build, build, lines).await
    }

    async fn test(&self, build: &Build, lines: LineSender) -> bool {
        self.run(Stage::Test, build, lines).await
    }

    async fn cleanup(&self, build: &Build) {
        self.calls
            .lock()
            .unwrap()
            .push(RunnerCall::Cleanup(build.id()));
    }
}

/// Notifier that records every status it is asked to publish.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<CommitStatus>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<CommitStatus> {
        self.sent.lock().unwrap().clone()
    }

    /// Wait until at least `count` statuses were sent.
    pub async fn wait_for(&self, count: usize) -> Vec<CommitStatus> {
        for _ in 0..500 {
            let sent = self.sent();
            if sent.len() >= count {
                return sent;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {} notifications, got {}", count, self.sent().len());
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, status: &CommitStatus) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(status.clone());
        if self.fail {
            return Err(NotifyError::Api {
                status: 500,
                message: "boom".to_string(),
            });
        }
        Ok(())
    }
}

pub fn request(sha: &str) -> BuildRequest {
    BuildRequest {
        commit_sha: sha.to_string(),
        repo_url: "https://github.com/octo/widgets.git".to_string(),
        repo_owner: "octo".to_string(),
        repo_name: "widgets".to_string(),
    }
}
