//! WebSocket endpoint driving the presence hub.
//!
//! WebSocket URL: ws(s)://{host}/ws
//!
//! The caller authenticates during the upgrade request, either with a
//! `Bearer` Authorization header or a `?token=` query parameter (browsers
//! cannot set headers on WebSocket requests). After that every frame is a
//! [`ClientMessage`] or [`ServerMessage`] in JSON.

use axum::{
    Router,
    extract::{
        Query, State, WebSocketUpgrade,
        ws::{Message, WebSocket, rejection::WebSocketUpgradeRejection},
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;

use super::protocol::{ClientMessage, ServerMessage, WsErrorCode};
use super::room::ConnectionHandle;
use crate::core::auth::{AuthenticatedUser, extract::bearer_credential};
use crate::core::error::{CollabError, CollabResult};
use crate::core::models::{MeetingId, ProjectId};
use crate::core::policy::{Action, authorize};
use crate::core::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct WsParams {
    #[serde(default)]
    pub token: Option<String>,
}

// ============================================================================
// WebSocket Handler
// ============================================================================

pub fn liveshare_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .with_state(state)
}

/// Verifies the caller, then upgrades. A bad or missing credential gets a
/// bare 401 and no upgrade.
pub async fn ws_handler(
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    headers: HeaderMap,
) -> Response {
    let Some(credential) = bearer_credential(&headers).or(params.token) else {
        return StatusCode::UNAUTHORIZED.into_response();
    };

    let user = match state.verifier.verify(&credential) {
        Ok(user) => user,
        Err(err) => {
            tracing::debug!(error = %err, "Refusing WebSocket upgrade");
            return StatusCode::UNAUTHORIZED.into_response();
        }
    };

    match ws {
        Ok(ws) => ws.on_upgrade(move |socket| handle_socket(socket, user, state)),
        Err(rejection) => rejection.into_response(),
    }
}

async fn handle_socket(socket: WebSocket, user: AuthenticatedUser, state: AppState) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (handle, mut rx) = state.hub.connect(user);

    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            match serde_json::to_string(&msg) {
                Ok(json) => {
                    if ws_sender.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!("Failed to serialize message: {}", e);
                }
            }
        }
    });

    tracing::info!(
        conn_id = %handle.id,
        user_id = %handle.user.user_id,
        "WebSocket connection opened"
    );

    let session = ConnectionSession::new(handle.clone(), state);

    loop {
        tokio::select! {
            result = ws_receiver.next() => {
                let Some(result) = result else {
                    break;
                };
                match result {
                    Ok(Message::Text(text)) => session.handle_text(text.as_str()).await,
                    Ok(Message::Binary(_)) => {
                        session
                            .reply(ServerMessage::error(
                                WsErrorCode::InvalidMessage,
                                "Binary frames are not supported",
                            ))
                            .await;
                    }
                    Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
                    Ok(Message::Close(_)) => {
                        tracing::debug!(conn_id = %handle.id, "Client closed connection");
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(conn_id = %handle.id, "WebSocket error: {}", e);
                        break;
                    }
                }
            }
            _ = handle.evicted() => {
                tracing::warn!(conn_id = %handle.id, "Closing connection that fell behind");
                break;
            }
        }
    }

    drop(session);
    send_task.abort();

    tracing::info!(
        conn_id = %handle.id,
        user_id = %handle.user.user_id,
        "WebSocket connection closed"
    );
}

// ============================================================================
// Connection Session
// ============================================================================

/// One live connection's view of the hub. Dropping it leaves every room.
pub struct ConnectionSession {
    handle: ConnectionHandle,
    state: AppState,
}

impl ConnectionSession {
    pub fn new(handle: ConnectionHandle, state: AppState) -> Self {
        Self { handle, state }
    }

    pub fn handle(&self) -> &ConnectionHandle {
        &self.handle
    }

    pub async fn handle_text(&self, text: &str) {
        match serde_json::from_str::<ClientMessage>(text) {
            Ok(msg) => {
                if let Err(err) = self.handle_message(msg).await {
                    tracing::debug!(conn_id = %self.handle.id, error = %err, "Message rejected");
                    self.reply(ServerMessage::from(&err)).await;
                }
            }
            Err(e) => {
                tracing::warn!(conn_id = %self.handle.id, "Invalid message format: {}", e);
                self.reply(ServerMessage::error(
                    WsErrorCode::InvalidMessage,
                    format!("Invalid message format: {}", e),
                ))
                .await;
            }
        }
    }

    pub async fn handle_message(&self, msg: ClientMessage) -> CollabResult<()> {
        let hub = &self.state.hub;
        match msg {
            ClientMessage::JoinRoom {
                project_id,
                meeting_id,
            } => {
                self.authorize_join(project_id, meeting_id).await?;
                if hub.join(project_id, &self.handle) {
                    self.confirm_join(project_id, meeting_id).await?;
                }
            }
            ClientMessage::LeaveRoom { project_id } => {
                hub.leave(project_id, self.handle.id);
            }
            ClientMessage::CodeChange {
                project_id,
                file_name,
                content,
            } => {
                hub.publish_code_change(project_id, &self.handle, file_name, content);
            }
            ClientMessage::CursorMove {
                project_id,
                position,
            } => {
                hub.publish_cursor_move(project_id, self.handle.id, position);
            }
            ClientMessage::ProjectUpdate {
                project_id,
                project,
            } => {
                hub.publish_project_update(project_id, self.handle.id, project);
            }
            ClientMessage::MeetingUpdate {
                project_id,
                meeting,
            } => {
                hub.publish_meeting_update(project_id, self.handle.id, meeting);
            }
            ClientMessage::Ping => self.reply(ServerMessage::Pong).await,
        }
        Ok(())
    }

    async fn authorize_join(
        &self,
        project_id: ProjectId,
        meeting_id: Option<MeetingId>,
    ) -> CollabResult<()> {
        let user = &self.handle.user;
        match meeting_id {
            Some(meeting_id) => {
                let project = self.state.meetings.access(meeting_id, user).await?;
                if project.id != project_id {
                    return Err(CollabError::forbidden(
                        "Meeting does not belong to this project",
                    ));
                }
            }
            None => {
                let project = self.state.sessions.project(project_id).await?;
                authorize(user, &project, Action::JoinRoom)?;
            }
        }
        Ok(())
    }

    /// Re-checks access once the connection is in the room. A removal that
    /// committed between the first check and the join found nothing to
    /// force out, so the connection leaves on its own here.
    async fn confirm_join(
        &self,
        project_id: ProjectId,
        meeting_id: Option<MeetingId>,
    ) -> CollabResult<()> {
        if let Err(err) = self.authorize_join(project_id, meeting_id).await {
            tracing::info!(
                conn_id = %self.handle.id,
                project_id = %project_id,
                "Access revoked during join"
            );
            self.state.hub.leave(project_id, self.handle.id);
            return Err(err);
        }
        Ok(())
    }

    pub async fn reply(&self, msg: ServerMessage) {
        if !self.handle.send(msg).await {
            tracing::debug!(conn_id = %self.handle.id, "Reply dropped, connection closing");
        }
    }
}

impl Drop for ConnectionSession {
    fn drop(&mut self) {
        self.state.hub.disconnect(self.handle.id);
    }
}
