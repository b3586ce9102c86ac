//! Wire protocol for the live collaboration WebSocket.
//!
//! Every frame is a JSON object `{ "type": ..., "payload": ... }` with
//! camelCase event names and field names.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::error::CollabError;
use crate::core::models::{MeetingId, ProjectId, UserId};

/// Zero-based editor cursor location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorPosition {
    pub row: u32,
    pub column: u32,
}

/// Roster entry of `initialState`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceInfo {
    pub username: String,
}

// ============================================================================
// WebSocket Protocol Messages
// ============================================================================

/// Client-to-server WebSocket messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "payload",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ClientMessage {
    /// Enter a project room, optionally through a scheduled meeting
    JoinRoom {
        project_id: ProjectId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        meeting_id: Option<MeetingId>,
    },

    LeaveRoom { project_id: ProjectId },

    /// Full-file content after a local edit
    CodeChange {
        project_id: ProjectId,
        file_name: String,
        content: String,
    },

    /// Cursor position update (volatile, can be dropped)
    CursorMove {
        project_id: ProjectId,
        position: CursorPosition,
    },

    ProjectUpdate {
        project_id: ProjectId,
        project: serde_json::Value,
    },

    MeetingUpdate {
        project_id: ProjectId,
        meeting: serde_json::Value,
    },

    Ping,
}

/// Server-to-client WebSocket messages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "payload",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ServerMessage {
    UserJoined { id: UserId, username: String },

    UserLeft { id: UserId },

    /// The user was removed from the project by its owner or an admin
    UserDisconnected { id: UserId },

    /// Who was already in the room when the recipient joined
    InitialState {
        collaborators: BTreeMap<UserId, PresenceInfo>,
    },

    CodeChange {
        project_id: ProjectId,
        file_name: String,
        content: String,
        sender_id: UserId,
    },

    CursorMove {
        user_id: UserId,
        username: String,
        position: CursorPosition,
    },

    ProjectUpdate { project: serde_json::Value },

    MeetingUpdate { meeting: serde_json::Value },

    Error { code: WsErrorCode, message: String },

    Pong,
}

/// Delivery class of an outbound event under back-pressure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessagePriority {
    /// Superseded by the next update; may be dropped for a slow subscriber
    Volatile,

    /// Must reach every subscriber or the subscriber is evicted
    Critical,
}

impl ServerMessage {
    pub fn error(code: WsErrorCode, message: impl Into<String>) -> Self {
        Self::Error {
            code,
            message: message.into(),
        }
    }

    pub fn priority(&self) -> MessagePriority {
        match self {
            Self::CursorMove { .. } => MessagePriority::Volatile,
            _ => MessagePriority::Critical,
        }
    }

    pub fn is_droppable(&self) -> bool {
        self.priority() == MessagePriority::Volatile
    }
}

/// Error codes carried by `error` frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WsErrorCode {
    InvalidMessage,
    Unauthorized,
    Forbidden,
    NotFound,
    BadRequest,
    InternalError,
}

impl From<&CollabError> for WsErrorCode {
    fn from(err: &CollabError) -> Self {
        match err {
            CollabError::Auth => WsErrorCode::Unauthorized,
            CollabError::Forbidden(_) => WsErrorCode::Forbidden,
            CollabError::NotFound(_) => WsErrorCode::NotFound,
            CollabError::Conflict { .. }
            | CollabError::Validation(_)
            | CollabError::AlreadyMember
            | CollabError::BadRequest(_) => WsErrorCode::BadRequest,
            CollabError::Internal(_) => WsErrorCode::InternalError,
        }
    }
}

impl From<&CollabError> for ServerMessage {
    fn from(err: &CollabError) -> Self {
        ServerMessage::error(err.into(), err.to_string())
    }
}
