//! Helpers for driving the router in tests.

use async_trait::async_trait;
use axum::body::to_bytes;
use axum::response::Response;
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;
use tinyci_core::{Build, LineSender, StageRunner};
use tinyci_scheduler::CiService;
use tinyci_store::FileBuildRepo;

use crate::AppState;
use crate::services::LogNotifier;

/// Runner whose stages succeed without doing anything.
struct NoopRunner;

#[async_trait]
impl StageRunner for NoopRunner {
    async fn clone_repo(&self, _build: &Build, _lines: LineSender) -> bool {
        true
    }

    async fn build(&self, _build: &Build, _lines: LineSender) -> bool {
        true
    }

    async fn test(&self, _build: &Build, _lines: LineSender) -> bool {
        true
    }

    async fn cleanup(&self, _build: &Build) {}
}

/// A service backed by a temporary store. The worker is never started, so
/// queued builds stay `QUEUED`.
pub struct TestApp {
    _dir: TempDir,
    pub repo: Arc<FileBuildRepo>,
    service: Arc<CiService>,
}

impl TestApp {
    pub async fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let repo = Arc::new(FileBuildRepo::open(dir.path()).await.unwrap());
        let service = Arc::new(CiService::new(
            repo.clone(),
            Arc::new(NoopRunner),
            Arc::new(LogNotifier),
        ));
        Self {
            _dir: dir,
            repo,
            service,
        }
    }

    pub fn state(&self) -> AppState {
        AppState::new(self.service.clone())
    }
}

pub async fn body_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
