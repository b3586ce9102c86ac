//! Scheduled meetings: time-boxed entry to a project.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::auth::AuthenticatedUser;
use crate::core::clock::Clock;
use crate::core::error::{CollabError, CollabResult};
use crate::core::models::{Meeting, MeetingId, Project, ProjectId};
use crate::core::policy::{Action, authorize};
use crate::core::sessions::SessionRegistry;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledMeeting {
    pub meeting: Meeting,
    pub meeting_link: String,
}

pub struct MeetingGate {
    meetings: DashMap<MeetingId, Meeting>,
    sessions: Arc<SessionRegistry>,
    clock: Arc<dyn Clock>,
    frontend_url: String,
}

impl MeetingGate {
    pub fn new(
        sessions: Arc<SessionRegistry>,
        clock: Arc<dyn Clock>,
        frontend_url: impl Into<String>,
    ) -> Self {
        Self {
            meetings: DashMap::new(),
            sessions,
            clock,
            frontend_url: frontend_url.into(),
        }
    }

    pub fn meeting_link(&self, meeting_id: MeetingId) -> String {
        format!("{}/projects/?meetingId={}", self.frontend_url, meeting_id)
    }

    pub async fn create_meeting(
        &self,
        project_id: ProjectId,
        requester: &AuthenticatedUser,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> CollabResult<ScheduledMeeting> {
        let project = self.sessions.project(project_id).await?;
        authorize(requester, &project, Action::ScheduleMeeting)?;
        if end_time <= start_time {
            return Err(CollabError::validation("End time must be after start time"));
        }

        let meeting = Meeting {
            id: Uuid::new_v4(),
            project_id,
            start_time,
            end_time,
            created_by: requester.user_id,
            created_at: self.clock.now(),
        };
        self.meetings.insert(meeting.id, meeting.clone());

        tracing::info!(
            meeting_id = %meeting.id,
            project_id = %project_id,
            start = %start_time,
            end = %end_time,
            "Meeting scheduled"
        );
        Ok(ScheduledMeeting {
            meeting_link: self.meeting_link(meeting.id),
            meeting,
        })
    }

    pub fn meeting(&self, meeting_id: MeetingId) -> Option<Meeting> {
        self.meetings.get(&meeting_id).map(|m| m.value().clone())
    }

    /// The meeting's project, if the window is open and `user` belongs to it.
    pub async fn access(
        &self,
        meeting_id: MeetingId,
        user: &AuthenticatedUser,
    ) -> CollabResult<Project> {
        let meeting = self
            .meeting(meeting_id)
            .ok_or_else(|| CollabError::not_found("Meeting"))?;

        if !meeting.is_open_at(self.clock.now()) {
            return Err(CollabError::forbidden("Meeting is not active"));
        }

        let project = self.sessions.project(meeting.project_id).await?;
        authorize(user, &project, Action::AttendMeeting)?;
        Ok(project)
    }
}
