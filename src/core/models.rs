//! Domain records shared across the collaboration core.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type UserId = Uuid;
pub type ProjectId = Uuid;
pub type MeetingId = Uuid;

/// Live rooms are scoped one per project.
pub type RoomId = ProjectId;

/// Caller role as asserted by the identity provider.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display,
)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[display("admin")]
    Admin,
    #[default]
    #[display("member")]
    Member,
}

impl Role {
    /// Case-insensitive; anything other than `admin` is a plain member.
    pub fn parse(raw: &str) -> Self {
        if raw.trim().eq_ignore_ascii_case("admin") {
            Role::Admin
        } else {
            Role::Member
        }
    }

    pub fn is_elevated(self) -> bool {
        matches!(self, Role::Admin)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    pub owner: UserId,
    /// Owner first, then joiners in join order.
    pub collaborators: Vec<UserId>,
    pub invite_code: Option<String>,
    pub session_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Project {
    pub fn new(id: ProjectId, name: impl Into<String>, owner: UserId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            name: name.into(),
            owner,
            collaborators: vec![owner],
            invite_code: None,
            session_active: false,
            created_at: now,
        }
    }

    pub fn is_owner(&self, user_id: UserId) -> bool {
        self.owner == user_id
    }

    pub fn is_collaborator(&self, user_id: UserId) -> bool {
        self.collaborators.contains(&user_id)
    }

    /// Drops everyone but the owner and closes the session.
    pub(crate) fn reset_session(&mut self) {
        self.collaborators = vec![self.owner];
        self.invite_code = None;
        self.session_active = false;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meeting {
    pub id: MeetingId,
    pub project_id: ProjectId,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub created_by: UserId,
    pub created_at: DateTime<Utc>,
}

impl Meeting {
    /// Both ends are inclusive.
    pub fn is_open_at(&self, at: DateTime<Utc>) -> bool {
        at >= self.start_time && at <= self.end_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_parse_is_case_insensitive() {
        assert_eq!(Role::parse("admin"), Role::Admin);
        assert_eq!(Role::parse("ADMIN"), Role::Admin);
        assert_eq!(Role::parse(" Admin "), Role::Admin);
        assert_eq!(Role::parse("member"), Role::Member);
        assert_eq!(Role::parse("superuser"), Role::Member);
        assert_eq!(Role::parse(""), Role::Member);
    }

    #[test]
    fn test_role_display() {
        assert_eq!(Role::Admin.to_string(), "admin");
        assert_eq!(Role::Member.to_string(), "member");
        assert!(Role::Admin.is_elevated());
        assert!(!Role::Member.is_elevated());
    }

    #[test]
    fn test_new_project_has_owner_as_only_collaborator() {
        let owner = Uuid::new_v4();
        let project = Project::new(Uuid::new_v4(), "demo", owner, Utc::now());

        assert_eq!(project.collaborators, vec![owner]);
        assert!(project.invite_code.is_none());
        assert!(!project.session_active);
    }

    #[test]
    fn test_project_serializes_camel_case() {
        let project = Project::new(Uuid::new_v4(), "demo", Uuid::new_v4(), Utc::now());
        let json = serde_json::to_value(&project).unwrap();

        assert!(json.get("inviteCode").is_some());
        assert_eq!(json["sessionActive"], false);
        assert!(json.get("createdAt").is_some());
    }

    #[test]
    fn test_meeting_window_bounds_are_inclusive() {
        let start = DateTime::from_timestamp(36_000, 0).unwrap();
        let end = DateTime::from_timestamp(39_600, 0).unwrap();
        let meeting = Meeting {
            id: Uuid::new_v4(),
            project_id: Uuid::new_v4(),
            start_time: start,
            end_time: end,
            created_by: Uuid::new_v4(),
            created_at: start,
        };

        assert!(meeting.is_open_at(start));
        assert!(meeting.is_open_at(end));
        assert!(!meeting.is_open_at(end + chrono::Duration::seconds(1)));
        assert!(!meeting.is_open_at(start - chrono::Duration::seconds(1)));
    }
}
