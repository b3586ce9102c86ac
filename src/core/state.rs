//! Application wiring: shared state and the top-level router.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{FromRef, State},
    http::{HeaderValue, Method, header},
    routing::get,
};
use serde::{Deserialize, Serialize};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

use super::auth::{IdentityVerifier, JwtService};
use super::clock::{Clock, SystemClock};
use super::config::Config;
use super::files::{FileStore, files_router};
use super::liveshare::{PresenceHub, liveshare_router};
use super::meetings::{MeetingGate, meetings_router};
use super::sessions::{SessionRegistry, sessions_router};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub verifier: Arc<dyn IdentityVerifier>,
    pub hub: Arc<PresenceHub>,
    pub sessions: Arc<SessionRegistry>,
    pub files: Arc<FileStore>,
    pub meetings: Arc<MeetingGate>,
}

impl AppState {
    pub fn new(config: Config, verifier: Arc<dyn IdentityVerifier>, clock: Arc<dyn Clock>) -> Self {
        let hub = Arc::new(PresenceHub::new(config.outbound_queue_capacity));
        let sessions = Arc::new(SessionRegistry::new(
            hub.clone(),
            clock.clone(),
            config.frontend_url.clone(),
        ));
        let files = Arc::new(FileStore::new(clock.clone()));
        let meetings = Arc::new(MeetingGate::new(
            sessions.clone(),
            clock,
            config.frontend_url.clone(),
        ));

        Self {
            config: Arc::new(config),
            verifier,
            hub,
            sessions,
            files,
            meetings,
        }
    }

    /// Production wiring: JWT verification and the wall clock.
    pub fn from_config(config: Config) -> Self {
        let verifier = Arc::new(JwtService::new(config.jwt.clone()));
        Self::new(config, verifier, Arc::new(SystemClock))
    }
}

impl FromRef<AppState> for Arc<dyn IdentityVerifier> {
    fn from_ref(state: &AppState) -> Self {
        state.verifier.clone()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub rooms: usize,
    pub connections: usize,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        rooms: state.hub.room_count(),
        connections: state.hub.connection_count(),
    })
}

fn cors_layer(frontend_url: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    match frontend_url.parse::<HeaderValue>() {
        Ok(origin) => layer.allow_origin(origin),
        Err(_) => {
            tracing::warn!(frontend_url, "FRONTEND_URL is not a valid origin, CORS disabled");
            layer
        }
    }
}

pub fn app_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.frontend_url);

    Router::new()
        .route("/health", get(health))
        .with_state(state.clone())
        .merge(sessions_router(state.clone()))
        .merge(files_router(state.clone()))
        .merge(meetings_router(state.clone()))
        .merge(liveshare_router(state))
        .layer(CompressionLayer::new())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::core::auth::AuthenticatedUser;
    use crate::core::clock::ManualClock;
    use crate::core::models::Role;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use chrono::{DateTime, Utc};
    use tower::ServiceExt;
    use uuid::Uuid;

    pub const TEST_SECRET: &str = "codeshare_test_secret_key_32_bytes!!";

    pub struct TestApp {
        pub state: AppState,
        pub clock: Arc<ManualClock>,
        jwt: JwtService,
    }

    impl TestApp {
        pub fn new() -> Self {
            let config = Config::with_secret(TEST_SECRET);
            let jwt = JwtService::new(config.jwt.clone());
            let clock = Arc::new(ManualClock::at_secs(1_700_000_000));
            let state = AppState::new(config, Arc::new(jwt.clone()), clock.clone());
            Self { state, clock, jwt }
        }

        pub fn clock_now(&self) -> DateTime<Utc> {
            self.clock.now()
        }

        pub fn user(&self, name: &str, role: Role) -> AuthenticatedUser {
            AuthenticatedUser {
                user_id: Uuid::new_v4(),
                username: name.to_string(),
                role,
            }
        }

        pub fn token(&self, user: &AuthenticatedUser) -> String {
            self.jwt
                .issue_token(user, chrono::Duration::minutes(10))
                .unwrap()
        }

        /// Send one request and decode the JSON body (`Null` when empty).
        pub async fn call(
            &self,
            router: Router,
            method: Method,
            uri: &str,
            user: Option<&AuthenticatedUser>,
            body: Option<serde_json::Value>,
        ) -> (StatusCode, serde_json::Value) {
            let mut request = Request::builder().method(method).uri(uri);
            if let Some(user) = user {
                request = request.header(header::AUTHORIZATION, format!("Bearer {}", self.token(user)));
            }
            let request = match body {
                Some(body) => request
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
                None => request.body(Body::empty()).unwrap(),
            };

            let response = router.oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
                .await
                .unwrap();
            let json = if bytes.is_empty() {
                serde_json::Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
            };
            (status, json)
        }
    }
}
