//! REST API handlers for project files
//!
//! - GET  /projects/{id}/files        - File names and versions
//! - POST /projects/{id}/files        - Create a file (400 if the name is taken)
//! - GET  /projects/{id}/files/{name} - Content and version (created empty if absent)
//! - POST /projects/{id}/files/{name} - Version-checked save

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::get,
};
use axum_extra::extract::WithRejection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::store::{FileSnapshot, FileSummary};
use crate::core::auth::AuthenticatedUser;
use crate::core::error::{ApiJson, ApiPath, CollabError};
use crate::core::policy::{Action, authorize};
use crate::core::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct SaveFileRequest {
    pub content: String,
    /// Version the client last read; omitted for a blind overwrite
    #[serde(default)]
    pub version: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateFileRequest {
    pub name: String,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateFileResponse {
    pub message: String,
    pub name: String,
    pub version: i64,
}

pub fn files_router(state: AppState) -> Router {
    Router::new()
        .route("/projects/{id}/files", get(list_files).post(create_file))
        .route("/projects/{id}/files/{name}", get(get_file).post(save_file))
        .with_state(state)
}

async fn ensure_file_access(
    state: &AppState,
    project_id: Uuid,
    user: &AuthenticatedUser,
) -> Result<(), CollabError> {
    let project = state.sessions.project(project_id).await?;
    authorize(user, &project, Action::EditFiles)?;
    Ok(())
}

async fn list_files(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    WithRejection(Path(id), _): ApiPath<Uuid>,
) -> Result<Json<Vec<FileSummary>>, CollabError> {
    ensure_file_access(&state, id, &user).await?;
    Ok(Json(state.files.list(id).await))
}

async fn create_file(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    WithRejection(Path(id), _): ApiPath<Uuid>,
    WithRejection(Json(req), _): ApiJson<CreateFileRequest>,
) -> Result<(StatusCode, Json<CreateFileResponse>), CollabError> {
    ensure_file_access(&state, id, &user).await?;
    let created = state.files.create(id, &req.name, req.content)?;
    Ok((
        StatusCode::CREATED,
        Json(CreateFileResponse {
            message: "File created".to_string(),
            name: req.name,
            version: created.version,
        }),
    ))
}

async fn get_file(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    WithRejection(Path((id, name)), _): ApiPath<(Uuid, String)>,
) -> Result<Json<FileSnapshot>, CollabError> {
    ensure_file_access(&state, id, &user).await?;
    Ok(Json(state.files.get(id, &name).await?))
}

async fn save_file(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    WithRejection(Path((id, name)), _): ApiPath<(Uuid, String)>,
    WithRejection(Json(req), _): ApiJson<SaveFileRequest>,
) -> Result<Json<FileSnapshot>, CollabError> {
    ensure_file_access(&state, id, &user).await?;
    let saved = state.files.save(id, &name, req.content, req.version).await?;

    state
        .hub
        .notify_file_saved(id, user.user_id, name, saved.content.clone());
    Ok(Json(saved))
}
