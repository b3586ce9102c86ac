//! Error type shared by the session registry, file store, meeting gate and
//! their HTTP handlers.

use axum::{
    Json,
    extract::{
        Path,
        rejection::{JsonRejection, PathRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use axum_extra::extract::WithRejection;
use serde::{Deserialize, Serialize};

use super::auth::IdentityError;
use super::policy::Denial;

pub type CollabResult<T> = Result<T, CollabError>;

/// JSON body extractor whose rejection is a [`CollabError`].
pub type ApiJson<T> = WithRejection<Json<T>, CollabError>;

/// Path extractor whose rejection is a [`CollabError`].
pub type ApiPath<T> = WithRejection<Path<T>, CollabError>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollabError {
    #[error("Authentication required")]
    Auth,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Version conflict")]
    Conflict { current_version: i64 },

    #[error("{0}")]
    Validation(String),

    #[error("User is already a collaborator")]
    AlreadyMember,

    #[error("{0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CollabError {
    pub fn forbidden(reason: impl Into<String>) -> Self {
        Self::Forbidden(reason.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            CollabError::Auth => StatusCode::UNAUTHORIZED,
            CollabError::Forbidden(_) => StatusCode::FORBIDDEN,
            CollabError::NotFound(_) => StatusCode::NOT_FOUND,
            CollabError::Conflict { .. } => StatusCode::CONFLICT,
            CollabError::Validation(_)
            | CollabError::AlreadyMember
            | CollabError::BadRequest(_) => StatusCode::BAD_REQUEST,
            CollabError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable kind.
    pub fn code(&self) -> &'static str {
        match self {
            CollabError::Auth => "UNAUTHORIZED",
            CollabError::Forbidden(_) => "FORBIDDEN",
            CollabError::NotFound(_) => "NOT_FOUND",
            CollabError::Conflict { .. } => "VERSION_CONFLICT",
            CollabError::Validation(_) => "VALIDATION_ERROR",
            CollabError::AlreadyMember => "ALREADY_MEMBER",
            CollabError::BadRequest(_) => "BAD_REQUEST",
            CollabError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<Denial> for CollabError {
    fn from(denial: Denial) -> Self {
        CollabError::Forbidden(denial.to_string())
    }
}

impl From<IdentityError> for CollabError {
    fn from(_: IdentityError) -> Self {
        CollabError::Auth
    }
}

impl From<JsonRejection> for CollabError {
    fn from(rejection: JsonRejection) -> Self {
        CollabError::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for CollabError {
    fn from(rejection: PathRejection) -> Self {
        CollabError::Validation(rejection.body_text())
    }
}

/// JSON body of every error response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    pub error: String,
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_version: Option<i64>,
}

impl From<&CollabError> for ApiError {
    fn from(err: &CollabError) -> Self {
        let current_version = match err {
            CollabError::Conflict { current_version } => Some(*current_version),
            _ => None,
        };
        Self {
            error: err.to_string(),
            code: err.code().to_string(),
            current_version,
        }
    }
}

impl IntoResponse for CollabError {
    fn into_response(self) -> Response {
        if let CollabError::Internal(detail) = &self {
            tracing::error!(error = %detail, "Request failed with internal error");
        }
        (self.status(), Json(ApiError::from(&self))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(CollabError::Auth.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            CollabError::forbidden("nope").status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            CollabError::not_found("Project").status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            CollabError::Conflict { current_version: 7 }.status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            CollabError::validation("bad").status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(CollabError::AlreadyMember.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            CollabError::bad_request("bad").status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            CollabError::Internal("boom".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_not_found_message() {
        assert_eq!(
            CollabError::not_found("Project").to_string(),
            "Project not found"
        );
    }

    #[test]
    fn test_conflict_body_carries_current_version() {
        let body = ApiError::from(&CollabError::Conflict {
            current_version: 1000,
        });
        let json = serde_json::to_value(&body).unwrap();

        assert_eq!(json["code"], "VERSION_CONFLICT");
        assert_eq!(json["currentVersion"], 1000);
    }

    #[test]
    fn test_non_conflict_body_omits_current_version() {
        let json = serde_json::to_value(ApiError::from(&CollabError::Auth)).unwrap();
        assert!(json.get("currentVersion").is_none());
        assert_eq!(json["error"], "Authentication required");
    }

    #[test]
    fn test_denial_converts_to_forbidden() {
        let err: CollabError = Denial::NotOwner.into();
        assert!(matches!(err, CollabError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_extractor_rejections_use_error_body() {
        use axum::{Router, body::Body, http::Request, routing::post};
        use tower::ServiceExt;
        use uuid::Uuid;

        #[derive(Deserialize)]
        struct Named {
            #[allow(dead_code)]
            name: String,
        }

        async fn handler(
            WithRejection(Path(_id), _): ApiPath<Uuid>,
            WithRejection(Json(_body), _): ApiJson<Named>,
        ) -> StatusCode {
            StatusCode::NO_CONTENT
        }

        let router = Router::new().route("/items/{id}", post(handler));
        let cases = [
            (format!("/items/{}", Uuid::new_v4()), "{ not json"),
            (format!("/items/{}", Uuid::new_v4()), r#"{"other": 1}"#),
            ("/items/not-a-uuid".to_string(), r#"{"name": "x"}"#),
        ];

        for (uri, body) in cases {
            let response = router
                .clone()
                .oneshot(
                    Request::post(uri)
                        .header("content-type", "application/json")
                        .body(Body::from(body))
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);

            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap();
            let body: ApiError = serde_json::from_slice(&bytes).unwrap();
            assert_eq!(body.code, "VALIDATION_ERROR");
            assert!(!body.error.is_empty());
        }
    }

    #[tokio::test]
    async fn test_into_response_sets_status_and_body() {
        let response = CollabError::Conflict {
            current_version: 42,
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: ApiError = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.current_version, Some(42));
    }
}
