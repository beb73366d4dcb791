//! Stage runner trait.
//!
//! A stage runner executes the fixed clone, build and test stages for a build
//! in a workspace directory keyed by the build id.

use async_trait::async_trait;
use derive_more::Display;
use tokio::sync::mpsc;

use crate::Build;

/// Channel end on which a runner delivers output lines, in emission order.
pub type LineSender = mpsc::Sender<String>;

/// One step of the fixed pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum Stage {
    Clone,
    Build,
    Test,
}

impl Stage {
    /// Pipeline order.
    pub const ALL: [Stage; 3] = [Stage::Clone, Stage::Build, Stage::Test];
}

/// Runs pipeline stages for a build.
///
/// Stage methods return `true` only when every underlying process exited with
/// status zero. Failure to start a process or to read its output is reported
/// as `false` plus an explanatory line on `lines`; it is never an error.
/// All output has been sent on `lines` by the time a method returns.
#[async_trait]
pub trait StageRunner: Send + Sync {
    /// Clone the repository into the workspace and check out the build's commit.
    async fn clone_repo(&self, build: &Build, lines: LineSender) -> bool;

    /// Compile the checked out project.
    async fn build(&self, build: &Build, lines: LineSender) -> bool;

    /// Run the project's tests.
    async fn test(&self, build: &Build, lines: LineSender) -> bool;

    /// Remove the build's workspace. Missing workspaces are not an error.
    async fn cleanup(&self, build: &Build);

    async fn run_stage(&self, stage: Stage, build: &Build, lines: LineSender) -> bool {
        match stage {
            Stage::Clone => self.clone_repo(build, lines).await,
            Stage::Build => self.build(build, lines).await,
            Stage::Test => self.test(build, lines).await,
        }
    }
}
