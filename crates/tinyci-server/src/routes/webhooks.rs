//! Push webhook endpoint.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tinyci_core::BuildRequest;
use tracing::info;

use crate::AppState;
use crate::error::ApiError;

pub fn router() -> Router<AppState> {
    Router::new().route("/webhook", post(push_webhook))
}

/// The parts of a GitHub push payload needed to build the pushed commit.
#[derive(Debug, Deserialize)]
struct PushPayload {
    after: String,
    repository: RepositoryPayload,
}

#[derive(Debug, Deserialize)]
struct RepositoryPayload {
    name: String,
    clone_url: String,
    owner: OwnerPayload,
}

#[derive(Debug, Deserialize)]
struct OwnerPayload {
    name: Option<String>,
    login: Option<String>,
}

impl PushPayload {
    /// Branch deletions report an all-zero `after` commit.
    fn is_deletion(&self) -> bool {
        !self.after.is_empty() && self.after.chars().all(|c| c == '0')
    }

    fn into_request(self) -> Result<BuildRequest, ApiError> {
        let RepositoryPayload {
            name,
            clone_url,
            owner,
        } = self.repository;

        let owner = owner
            .name
            .or(owner.login)
            .filter(|o| !o.is_empty())
            .ok_or_else(|| ApiError::BadRequest("Missing repository owner".to_string()))?;
        if self.after.is_empty() || name.is_empty() || clone_url.is_empty() {
            return Err(ApiError::BadRequest(
                "Missing commit or repository fields".to_string(),
            ));
        }

        Ok(BuildRequest {
            commit_sha: self.after,
            repo_url: clone_url,
            repo_owner: owner,
            repo_name: name,
        })
    }
}

async fn push_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let event_type = headers
        .get("X-GitHub-Event")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("push");

    if event_type != "push" {
        info!(event = %event_type, "Ignoring non-push event");
        return Ok(ignored("not a push event"));
    }

    let payload: PushPayload = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid push payload: {}", e)))?;

    if payload.is_deletion() {
        info!(repo = %payload.repository.name, "Ignoring branch deletion");
        return Ok(ignored("branch deleted"));
    }

    let request = payload.into_request()?;
    info!(
        repo = %request.repo_name,
        sha = %request.commit_sha,
        "Received push"
    );

    let build_id = state.service.enqueue(request).await?;
    Ok((StatusCode::ACCEPTED, Json(json!({ "build_id": build_id }))).into_response())
}

fn ignored(reason: &str) -> Response {
    (StatusCode::OK, Json(json!({ "ignored": reason }))).into_response()
}
