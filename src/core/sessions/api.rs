//! REST API handlers for projects and their invite sessions
//!
//! - POST   /projects                              - Create a project
//! - GET    /projects                              - Projects visible to the caller
//! - GET    /projects/{id}                         - Project details
//! - POST   /projects/{id}/invite                  - Start or fetch the invite session
//! - DELETE /projects/{id}/session                 - End the invite session
//! - POST   /projects/join                         - Join via invite code
//! - POST   /projects/{id}/collaborators           - Add a collaborator directly
//! - DELETE /projects/{id}/collaborators/{user_id} - Remove a collaborator

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
};
use axum_extra::extract::WithRejection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::registry::Invite;
use crate::core::auth::AuthenticatedUser;
use crate::core::error::{ApiJson, ApiPath, CollabError};
use crate::core::models::Project;
use crate::core::state::AppState;

// ============================================================================
// Request/Response DTOs
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateProjectRequest {
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinProjectRequest {
    pub invite_code: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddCollaboratorRequest {
    pub user_id: Uuid,
    /// Checked against the running session's code when present
    #[serde(default)]
    pub invite_code: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RemoveCollaboratorResponse {
    pub message: String,
    pub project: Project,
}

// ============================================================================
// Router
// ============================================================================

pub fn sessions_router(state: AppState) -> Router {
    Router::new()
        .route("/projects", post(create_project).get(list_projects))
        .route("/projects/join", post(join_project))
        .route("/projects/{id}", get(get_project))
        .route("/projects/{id}/invite", post(create_invite))
        .route("/projects/{id}/session", delete(end_session))
        .route("/projects/{id}/collaborators", post(add_collaborator))
        .route(
            "/projects/{id}/collaborators/{user_id}",
            delete(remove_collaborator),
        )
        .with_state(state)
}

// ============================================================================
// Handlers
// ============================================================================

async fn create_project(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    WithRejection(Json(req), _): ApiJson<CreateProjectRequest>,
) -> Result<(StatusCode, Json<Project>), CollabError> {
    let project = state.sessions.create_project(&user, &req.name).await?;
    Ok((StatusCode::CREATED, Json(project)))
}

async fn list_projects(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Json<Vec<Project>> {
    Json(state.sessions.list_projects(&user).await)
}

async fn get_project(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    WithRejection(Path(id), _): ApiPath<Uuid>,
) -> Result<Json<Project>, CollabError> {
    Ok(Json(state.sessions.get_project(id, &user).await?))
}

async fn create_invite(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    WithRejection(Path(id), _): ApiPath<Uuid>,
) -> Result<Json<Invite>, CollabError> {
    Ok(Json(state.sessions.create_or_rotate_invite(id, &user).await?))
}

async fn end_session(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    WithRejection(Path(id), _): ApiPath<Uuid>,
) -> Result<Json<Project>, CollabError> {
    Ok(Json(state.sessions.end_session(id, &user).await?))
}

async fn join_project(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    WithRejection(Json(req), _): ApiJson<JoinProjectRequest>,
) -> Result<Json<Project>, CollabError> {
    Ok(Json(state.sessions.join(&req.invite_code, &user).await?))
}

async fn add_collaborator(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    WithRejection(Path(id), _): ApiPath<Uuid>,
    WithRejection(Json(req), _): ApiJson<AddCollaboratorRequest>,
) -> Result<Json<Project>, CollabError> {
    let project = state
        .sessions
        .add_collaborator(id, req.user_id, req.invite_code.as_deref(), &user)
        .await?;
    Ok(Json(project))
}

async fn remove_collaborator(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    WithRejection(Path((id, user_id)), _): ApiPath<(Uuid, Uuid)>,
) -> Result<Json<RemoveCollaboratorResponse>, CollabError> {
    let project = state
        .sessions
        .remove_collaborator(id, user_id, &user)
        .await?;
    Ok(Json(RemoveCollaboratorResponse {
        message: "Collaborator removed".to_string(),
        project,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::Role;
    use crate::core::state::test_support::TestApp;
    use axum::http::Method;
    use serde_json::json;

    #[tokio::test]
    async fn test_requests_without_token_are_unauthorized() {
        let app = TestApp::new();
        let router = sessions_router(app.state.clone());

        let (status, body) = app.call(router, Method::GET, "/projects", None, None).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], "UNAUTHORIZED");
    }

    #[tokio::test]
    async fn test_invite_join_remove_flow() {
        let app = TestApp::new();
        let router = sessions_router(app.state.clone());
        let owner = app.user("owner", Role::Member);
        let member = app.user("member", Role::Member);

        let (status, project) = app
            .call(
                router.clone(),
                Method::POST,
                "/projects",
                Some(&owner),
                Some(json!({ "name": "demo" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = project["id"].as_str().unwrap().to_string();

        let (status, invite) = app
            .call(
                router.clone(),
                Method::POST,
                &format!("/projects/{id}/invite"),
                Some(&owner),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let code = invite["inviteCode"].as_str().unwrap().to_string();
        assert_eq!(
            invite["meetingLink"],
            format!("http://localhost:5173/meeting/{id}")
        );

        let (status, joined) = app
            .call(
                router.clone(),
                Method::POST,
                "/projects/join",
                Some(&member),
                Some(json!({ "inviteCode": code })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(joined["collaborators"].as_array().unwrap().len(), 2);

        let (status, body) = app
            .call(
                router.clone(),
                Method::POST,
                "/projects/join",
                Some(&member),
                Some(json!({ "inviteCode": code })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "ALREADY_MEMBER");

        let (status, body) = app
            .call(
                router.clone(),
                Method::DELETE,
                &format!("/projects/{id}/collaborators/{}", owner.user_id),
                Some(&owner),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "BAD_REQUEST");

        let (status, body) = app
            .call(
                router.clone(),
                Method::DELETE,
                &format!("/projects/{id}/collaborators/{}", member.user_id),
                Some(&owner),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Collaborator removed");
        assert_eq!(body["project"]["collaborators"].as_array().unwrap().len(), 1);

        let (status, _) = app
            .call(
                router,
                Method::DELETE,
                &format!("/projects/{id}/collaborators/{}", member.user_id),
                Some(&owner),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unknown_invite_code_is_not_found() {
        let app = TestApp::new();
        let router = sessions_router(app.state.clone());
        let member = app.user("member", Role::Member);

        let (status, body) = app
            .call(
                router,
                Method::POST,
                "/projects/join",
                Some(&member),
                Some(json!({ "inviteCode": "NOPE1234" })),
            )
            .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_non_owner_cannot_rotate_or_end() {
        let app = TestApp::new();
        let router = sessions_router(app.state.clone());
        let owner = app.user("owner", Role::Member);
        let stranger = app.user("stranger", Role::Member);
        let project = app.state.sessions.create_project(&owner, "demo").await.unwrap();

        let (status, _) = app
            .call(
                router.clone(),
                Method::POST,
                &format!("/projects/{}/invite", project.id),
                Some(&stranger),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = app
            .call(
                router.clone(),
                Method::DELETE,
                &format!("/projects/{}/session", project.id),
                Some(&stranger),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = app
            .call(
                router,
                Method::DELETE,
                &format!("/projects/{}/session", project.id),
                Some(&owner),
                None,
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["sessionActive"], false);
    }

    #[tokio::test]
    async fn test_get_unknown_project_is_not_found() {
        let app = TestApp::new();
        let router = sessions_router(app.state.clone());
        let owner = app.user("owner", Role::Member);

        let (status, _) = app
            .call(
                router,
                Method::GET,
                &format!("/projects/{}", Uuid::new_v4()),
                Some(&owner),
                None,
            )
            .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_add_collaborator_directly() {
        let app = TestApp::new();
        let router = sessions_router(app.state.clone());
        let owner = app.user("owner", Role::Member);
        let member = app.user("member", Role::Member);
        let stranger = app.user("stranger", Role::Member);
        let project = app.state.sessions.create_project(&owner, "demo").await.unwrap();
        let uri = format!("/projects/{}/collaborators", project.id);

        let (status, _) = app
            .call(
                router.clone(),
                Method::POST,
                &uri,
                Some(&stranger),
                Some(json!({ "userId": member.user_id })),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = app
            .call(
                router.clone(),
                Method::POST,
                &uri,
                Some(&owner),
                Some(json!({ "userId": member.user_id, "inviteCode": "WRONG123" })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid invite code");

        let (status, body) = app
            .call(
                router,
                Method::POST,
                &uri,
                Some(&owner),
                Some(json!({ "userId": member.user_id })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["collaborators"].as_array().unwrap().len(), 2);
        assert!(
            app.state
                .sessions
                .associations(member.user_id)
                .await
                .projects_joined
                .contains(&project.id)
        );
    }

    #[tokio::test]
    async fn test_malformed_requests_get_error_body() {
        let app = TestApp::new();
        let router = sessions_router(app.state.clone());
        let owner = app.user("owner", Role::Member);

        let (status, body) = app
            .call(router.clone(), Method::GET, "/projects/not-a-uuid", Some(&owner), None)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_ERROR");

        let (status, body) = app
            .call(
                router,
                Method::POST,
                "/projects",
                Some(&owner),
                Some(json!({ "title": "missing name" })),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_ERROR");
        assert!(body["error"].as_str().is_some_and(|e| !e.is_empty()));
    }
}
