//! Authorization rules for every project-scoped operation.
//!
//! [`authorize`] is pure: it looks only at the caller, the project and the
//! requested action. Time-based checks (meeting windows) live with the
//! meeting gate.

use super::auth::AuthenticatedUser;
use super::models::Project;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    RotateInvite,
    EndSession,
    AddCollaborator,
    RemoveCollaborator,
    ViewProject,
    EditFiles,
    ScheduleMeeting,
    AttendMeeting,
    JoinRoom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Denial {
    #[error("Only the project owner can generate invites")]
    NotOwner,

    #[error("Only the project owner or an admin can perform this action")]
    NotOwnerOrAdmin,

    #[error("Not a project collaborator")]
    NotCollaborator,

    #[error("Not authorized to access this project")]
    NoAccess,
}

pub fn authorize(
    subject: &AuthenticatedUser,
    project: &Project,
    action: Action,
) -> Result<(), Denial> {
    let is_owner = project.is_owner(subject.user_id);
    let is_collaborator = project.is_collaborator(subject.user_id);
    let is_admin = subject.role.is_elevated();

    match action {
        // Admins cannot mint codes for someone else's project.
        Action::RotateInvite => is_owner.then_some(()).ok_or(Denial::NotOwner),
        Action::EndSession
        | Action::AddCollaborator
        | Action::RemoveCollaborator
        | Action::ScheduleMeeting => {
            (is_owner || is_admin)
                .then_some(())
                .ok_or(Denial::NotOwnerOrAdmin)
        }
        Action::ViewProject | Action::JoinRoom => {
            (is_owner || is_admin || (is_collaborator && project.session_active))
                .then_some(())
                .ok_or(Denial::NoAccess)
        }
        Action::EditFiles => (is_owner || is_collaborator || is_admin)
            .then_some(())
            .ok_or(Denial::NoAccess),
        Action::AttendMeeting => (is_collaborator || is_admin)
            .then_some(())
            .ok_or(Denial::NotCollaborator),
    }
}
