//! REST API handlers for scheduled meetings
//!
//! - POST /meetings/{project_id} - Schedule a meeting
//! - GET  /meetings/{meeting_id} - Enter a meeting (window and membership checked)

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::post,
};
use chrono::{DateTime, Utc};
use axum_extra::extract::WithRejection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::gate::ScheduledMeeting;
use crate::core::auth::AuthenticatedUser;
use crate::core::error::{ApiJson, ApiPath, CollabError};
use crate::core::models::Project;
use crate::core::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleMeetingRequest {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

/// `{id}` is a project id for POST and a meeting id for GET.
pub fn meetings_router(state: AppState) -> Router {
    Router::new()
        .route("/meetings/{id}", post(schedule_meeting).get(enter_meeting))
        .with_state(state)
}

async fn schedule_meeting(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    WithRejection(Path(project_id), _): ApiPath<Uuid>,
    WithRejection(Json(req), _): ApiJson<ScheduleMeetingRequest>,
) -> Result<(StatusCode, Json<ScheduledMeeting>), CollabError> {
    let scheduled = state
        .meetings
        .create_meeting(project_id, &user, req.start_time, req.end_time)
        .await?;
    Ok((StatusCode::CREATED, Json(scheduled)))
}

async fn enter_meeting(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    WithRejection(Path(meeting_id), _): ApiPath<Uuid>,
) -> Result<Json<Project>, CollabError> {
    Ok(Json(state.meetings.access(meeting_id, &user).await?))
}
