//! Build entity and its lifecycle.
//!
//! A build moves forward through `QUEUED -> RUNNING -> SUCCESS | FAILED` and
//! never back. `started_at` is set exactly when the build leaves `QUEUED`,
//! `finished_at` exactly when it reaches a terminal status.

use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::{BuildId, Error, Result};

/// Lifecycle status of a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuildStatus {
    #[display("QUEUED")]
    Queued,
    #[display("RUNNING")]
    Running,
    #[display("SUCCESS")]
    Success,
    #[display("FAILED")]
    Failed,
}

impl BuildStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, BuildStatus::Success | BuildStatus::Failed)
    }
}

/// A validated request to build one commit, as handed over by the ingress layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRequest {
    pub commit_sha: String,
    pub repo_url: String,
    pub repo_owner: String,
    pub repo_name: String,
}

/// One attempt to clone, compile and test a specific commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Build {
    id: BuildId,
    commit_sha: String,
    repo_url: String,
    repo_owner: String,
    repo_name: String,
    status: BuildStatus,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

impl Build {
    /// Create a new queued build with a fresh id.
    pub fn new(
        commit_sha: impl Into<String>,
        repo_url: impl Into<String>,
        repo_owner: impl Into<String>,
        repo_name: impl Into<String>,
    ) -> Self {
        Self {
            id: BuildId::new(),
            commit_sha: commit_sha.into(),
            repo_url: repo_url.into(),
            repo_owner: repo_owner.into(),
            repo_name: repo_name.into(),
            status: BuildStatus::Queued,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    pub fn from_request(request: BuildRequest) -> Self {
        Self::new(
            request.commit_sha,
            request.repo_url,
            request.repo_owner,
            request.repo_name,
        )
    }

    /// Reconstruct a build from persisted fields.
    ///
    /// No lifecycle rules are checked; this is only meant for loading records
    /// that were written by the store.
    #[allow(clippy::too_many_arguments)]
    pub fn rehydrate(
        id: BuildId,
        commit_sha: String,
        repo_url: String,
        repo_owner: String,
        repo_name: String,
        status: BuildStatus,
        created_at: DateTime<Utc>,
        started_at: Option<DateTime<Utc>>,
        finished_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            id,
            commit_sha,
            repo_url,
            repo_owner,
            repo_name,
            status,
            created_at,
            started_at,
            finished_at,
        }
    }

    pub fn id(&self) -> BuildId {
        self.id
    }

    pub fn commit_sha(&self) -> &str {
        &self.commit_sha
    }

    pub fn repo_url(&self) -> &str {
        &self.repo_url
    }

    pub fn repo_owner(&self) -> &str {
        &self.repo_owner
    }

    pub fn repo_name(&self) -> &str {
        &self.repo_name
    }

    pub fn status(&self) -> BuildStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Move a queued build to `RUNNING`.
    ///
    /// Fails with [`Error::InvalidTransition`] if the build has already been
    /// started; the build is left unchanged in that case.
    pub fn start(&mut self) -> Result<()> {
        self.transition(BuildStatus::Queued, BuildStatus::Running)?;
        self.started_at = Some(not_before(self.created_at));
        Ok(())
    }

    /// Move a running build to `SUCCESS`.
    pub fn succeed(&mut self) -> Result<()> {
        self.finish(BuildStatus::Success)
    }

    /// Move a running build to `FAILED`.
    pub fn fail(&mut self) -> Result<()> {
        self.finish(BuildStatus::Failed)
    }

    pub fn summary(&self) -> BuildSummary {
        BuildSummary::from(self)
    }

    fn finish(&mut self, to: BuildStatus) -> Result<()> {
        self.transition(BuildStatus::Running, to)?;
        let started_at = self.started_at.unwrap_or(self.created_at);
        self.finished_at = Some(not_before(started_at));
        Ok(())
    }

    fn transition(&mut self, expected: BuildStatus, to: BuildStatus) -> Result<()> {
        if self.status != expected {
            return Err(Error::InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }
}

// Wall clocks can step backwards; lifecycle timestamps must not.
fn not_before(earlier: DateTime<Utc>) -> DateTime<Utc> {
    Utc::now().max(earlier)
}

/// Listing projection of a build, written to the index when the build is first saved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSummary {
    pub id: BuildId,
    pub commit_sha: String,
    pub created_at: DateTime<Utc>,
}

impl From<&Build> for BuildSummary {
    fn from(build: &Build) -> Self {
        Self {
            id: build.id,
            commit_sha: build.commit_sha.clone(),
            created_at: build.created_at,
        }
    }
}
