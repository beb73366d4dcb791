//! Runs pipeline stages as processes on the local machine.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tinyci_core::{Build, LineSender, StageRunner};
use tokio::process::Command;
use tracing::{info, warn};

use crate::process::run_process;

/// Stage runner that checks builds out into `{workspace_root}/{build id}` and
/// runs git and the project's Maven wrapper there.
pub struct LocalProcessRunner {
    workspace_root: PathBuf,
}

impl LocalProcessRunner {
    const BUILD_ARGS: &'static [&'static str] = &["compile"];
    const TEST_ARGS: &'static [&'static str] = &["test"];
    const WRAPPER: &'static str = "mvnw";

    /// Create a runner whose workspaces live under `workspace_root`.
    ///
    /// The root is made absolute so that commands run inside a workspace
    /// resolve paths the same way regardless of the server's working directory.
    pub fn new(workspace_root: impl AsRef<Path>) -> std::io::Result<Self> {
        Ok(Self {
            workspace_root: std::path::absolute(workspace_root)?,
        })
    }

    /// Workspace directory of a build.
    pub fn workspace(&self, build: &Build) -> PathBuf {
        self.workspace_root.join(build.id().to_string())
    }

    async fn run_wrapper(&self, build: &Build, args: &[&str], lines: &LineSender) -> bool {
        let workspace = self.workspace(build);
        let _ = lines
            .send(format!("$ ./{} {}", Self::WRAPPER, args.join(" ")))
            .await;

        let mut command = Command::new(workspace.join(Self::WRAPPER));
        command.args(args).current_dir(&workspace);
        run_process(command, lines).await
    }
}

#[async_trait]
impl StageRunner for LocalProcessRunner {
    async fn clone_repo(&self, build: &Build, lines: LineSender) -> bool {
        let workspace = self.workspace(build);

        // A leading dash would be parsed by git as an option.
        if build.commit_sha().starts_with('-') {
            let _ = lines
                .send(format!("ERROR: invalid commit {}", build.commit_sha()))
                .await;
            return false;
        }

        if let Err(e) = tokio::fs::create_dir_all(&self.workspace_root).await {
            let _ = lines
                .send(format!(
                    "ERROR: cannot create workspace root {}: {}",
                    self.workspace_root.display(),
                    e
                ))
                .await;
            return false;
        }

        info!(build_id = %build.id(), repo = %build.repo_url(), "Cloning repository");
        let _ = lines.send(format!("$ git clone {}", build.repo_url())).await;
        let mut clone = Command::new("git");
        clone
            .arg("clone")
            .arg("--")
            .arg(build.repo_url())
            .arg(&workspace)
            .env("GIT_TERMINAL_PROMPT", "0");
        if !run_process(clone, &lines).await {
            return false;
        }

        let _ = lines
            .send(format!("$ git checkout {}", build.commit_sha()))
            .await;
        let mut checkout = Command::new("git");
        checkout
            .arg("checkout")
            .arg(build.commit_sha())
            .current_dir(&workspace);
        run_process(checkout, &lines).await
    }

    async fn build(&self, build: &Build, lines: LineSender) -> bool {
        self.run_wrapper(build, Self::BUILD_ARGS, &lines).await
    }

    async fn test(&self, build: &Build, lines: LineSender) -> bool {
        self.run_wrapper(build, Self::TEST_ARGS, &lines).await
    }

    async fn cleanup(&self, build: &Build) {
        let workspace = self.workspace(build);
        match tokio::fs::remove_dir_all(&workspace).await {
            Ok(()) => info!(build_id = %build.id(), "Removed workspace"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                warn!(build_id = %build.id(), path = %workspace.display(), error = %e, "Failed to remove workspace");
            }
        }
    }
}
