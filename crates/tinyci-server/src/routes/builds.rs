//! Build query endpoints.

use axum::Json;
use axum::Router;
use axum::extract::{Path, Query, State};
use axum::routing::get;
use serde::Deserialize;
use serde_json::{Value, json};
use tinyci_core::{BuildId, LogSlice};
use tinyci_store::{BuildRecord, BuildRepo};

use crate::AppState;
use crate::error::ApiError;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_builds))
        .route("/{id}", get(get_build))
        .route("/{id}/log", get(get_log))
}

#[derive(Debug, Deserialize)]
struct LogQuery {
    offset: Option<u64>,
}

fn parse_id(raw: &str) -> Result<BuildId, ApiError> {
    raw.parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid build id '{}': {}", raw, e)))
}

fn not_found(id: BuildId) -> ApiError {
    ApiError::NotFound(format!("Build {} not found", id))
}

async fn list_builds(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let builds = state.repo().list().await?;
    Ok(Json(json!({ "builds": builds })))
}

async fn get_build(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<BuildRecord>, ApiError> {
    let id = parse_id(&id)?;
    let build = state
        .repo()
        .find_by_id(id)
        .await?
        .ok_or_else(|| not_found(id))?;
    Ok(Json(BuildRecord::from(&build)))
}

/// Full log, or a bounded slice when `offset` is given.
async fn get_log(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<LogQuery>,
) -> Result<Json<Value>, ApiError> {
    let id = parse_id(&id)?;
    let repo = state.repo();

    match query.offset {
        Some(offset) => {
            let LogSlice {
                content,
                next_offset,
                end_reached,
            } = repo
                .get_log_slice(id, offset)
                .await?
                .ok_or_else(|| not_found(id))?;
            Ok(Json(json!({
                "content": content,
                "next_offset": next_offset,
                "end_reached": end_reached,
            })))
        }
        None => {
            let log = repo.get_log(id).await?.ok_or_else(|| not_found(id))?;
            Ok(Json(json!({ "content": log.content })))
        }
    }
}
