//! Project sessions: who may be in a project, and the invite code that lets
//! new people in.
//!
//! Projects and the per-user association lists live behind one lock so a
//! rotation, join, removal or end-of-session updates both sides together.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use rand::{Rng, distributions::Alphanumeric};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::core::auth::AuthenticatedUser;
use crate::core::clock::Clock;
use crate::core::error::{CollabError, CollabResult};
use crate::core::liveshare::PresenceHub;
use crate::core::models::{Project, ProjectId, UserId};
use crate::core::policy::{Action, authorize};

pub const INVITE_CODE_LEN: usize = 8;

/// Projects a user owns or has joined.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAssociations {
    pub projects_owned: BTreeSet<ProjectId>,
    pub projects_joined: BTreeSet<ProjectId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invite {
    pub invite_code: String,
    pub meeting_link: String,
}

#[derive(Debug, Default)]
struct RegistryState {
    projects: HashMap<ProjectId, Project>,
    active_codes: HashMap<String, ProjectId>,
    /// Codes of ended sessions; never handed out again.
    retired_codes: HashSet<String>,
    associations: HashMap<UserId, UserAssociations>,
}

/// What closing a session changed.
struct SessionReset {
    project: Project,
    /// Non-owner collaborators dropped by the reset
    removed: Vec<UserId>,
}

impl RegistryState {
    fn project_mut(&mut self, project_id: ProjectId) -> CollabResult<&mut Project> {
        self.projects
            .get_mut(&project_id)
            .ok_or_else(|| CollabError::not_found("Project"))
    }

    fn unjoin(&mut self, user_id: UserId, project_id: ProjectId) {
        if let Some(assoc) = self.associations.get_mut(&user_id) {
            assoc.projects_joined.remove(&project_id);
        }
    }

    /// Close the session of `project_id` and drop every non-owner's
    /// association with it.
    fn reset_session(&mut self, project_id: ProjectId) -> CollabResult<SessionReset> {
        let project = self.project_mut(project_id)?;
        let owner = project.owner;
        let removed: Vec<UserId> = project
            .collaborators
            .iter()
            .copied()
            .filter(|u| *u != owner)
            .collect();
        let old_code = project.invite_code.clone();
        project.reset_session();
        let snapshot = project.clone();

        if let Some(code) = old_code {
            self.active_codes.remove(&code);
            self.retired_codes.insert(code);
        }
        for user_id in &removed {
            self.unjoin(*user_id, project_id);
        }
        Ok(SessionReset {
            project: snapshot,
            removed,
        })
    }

    fn fresh_code(&self) -> String {
        let mut rng = rand::thread_rng();
        loop {
            let code: String = (&mut rng)
                .sample_iter(&Alphanumeric)
                .take(INVITE_CODE_LEN)
                .map(char::from)
                .collect();
            if !self.active_codes.contains_key(&code) && !self.retired_codes.contains(&code) {
                return code;
            }
        }
    }
}

pub struct SessionRegistry {
    state: RwLock<RegistryState>,
    hub: Arc<PresenceHub>,
    clock: Arc<dyn Clock>,
    frontend_url: String,
}

impl SessionRegistry {
    pub fn new(hub: Arc<PresenceHub>, clock: Arc<dyn Clock>, frontend_url: impl Into<String>) -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            hub,
            clock,
            frontend_url: frontend_url.into(),
        }
    }

    pub fn meeting_link(&self, project_id: ProjectId) -> String {
        format!("{}/meeting/{}", self.frontend_url, project_id)
    }

    pub async fn create_project(&self, owner: &AuthenticatedUser, name: &str) -> CollabResult<Project> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CollabError::validation("Project name must not be empty"));
        }

        let project = Project::new(Uuid::new_v4(), name, owner.user_id, self.clock.now());
        let mut state = self.state.write().await;
        state.projects.insert(project.id, project.clone());
        state
            .associations
            .entry(owner.user_id)
            .or_default()
            .projects_owned
            .insert(project.id);

        tracing::info!(project_id = %project.id, owner = %owner.user_id, "Project created");
        Ok(project)
    }

    /// Unchecked lookup for other core components.
    pub async fn project(&self, project_id: ProjectId) -> CollabResult<Project> {
        self.state
            .read()
            .await
            .projects
            .get(&project_id)
            .cloned()
            .ok_or_else(|| CollabError::not_found("Project"))
    }

    pub async fn get_project(
        &self,
        project_id: ProjectId,
        requester: &AuthenticatedUser,
    ) -> CollabResult<Project> {
        let project = self.project(project_id).await?;
        authorize(requester, &project, Action::ViewProject)?;
        Ok(project)
    }

    /// Projects the user owns, plus active sessions they collaborate in.
    pub async fn list_projects(&self, user: &AuthenticatedUser) -> Vec<Project> {
        let state = self.state.read().await;
        let mut projects: Vec<Project> = state
            .projects
            .values()
            .filter(|p| {
                p.is_owner(user.user_id) || (p.session_active && p.is_collaborator(user.user_id))
            })
            .cloned()
            .collect();
        projects.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        projects
    }

    pub async fn associations(&self, user_id: UserId) -> UserAssociations {
        self.state
            .read()
            .await
            .associations
            .get(&user_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Returns the running session's code, or starts a new session with a
    /// fresh code and an owner-only collaborator list.
    pub async fn create_or_rotate_invite(
        &self,
        project_id: ProjectId,
        requester: &AuthenticatedUser,
    ) -> CollabResult<Invite> {
        let (code, snapshot, removed) = {
            let mut state = self.state.write().await;
            let project = state.project_mut(project_id)?;
            authorize(requester, project, Action::RotateInvite)?;

            if project.session_active
                && let Some(code) = &project.invite_code
            {
                return Ok(Invite {
                    invite_code: code.clone(),
                    meeting_link: self.meeting_link(project_id),
                });
            }

            let reset = state.reset_session(project_id)?;
            let code = state.fresh_code();
            let project = state.project_mut(project_id)?;
            project.invite_code = Some(code.clone());
            project.session_active = true;
            let snapshot = project.clone();
            state.active_codes.insert(code.clone(), project_id);
            (code, snapshot, reset.removed)
        };

        tracing::info!(project_id = %project_id, "Invite session started");
        if !removed.is_empty() {
            self.sync_room(&snapshot, &removed);
        }
        Ok(Invite {
            invite_code: code,
            meeting_link: self.meeting_link(project_id),
        })
    }

    /// Adds `user_id` directly, bypassing the invite code flow. When
    /// `invite_code` is given it must match the running session's code.
    /// Adding an existing collaborator is a no-op.
    pub async fn add_collaborator(
        &self,
        project_id: ProjectId,
        user_id: UserId,
        invite_code: Option<&str>,
        requester: &AuthenticatedUser,
    ) -> CollabResult<Project> {
        let snapshot = {
            let mut state = self.state.write().await;
            let project = state.project_mut(project_id)?;
            authorize(requester, project, Action::AddCollaborator)?;
            if let Some(code) = invite_code
                && project.invite_code.as_deref() != Some(code)
            {
                return Err(CollabError::bad_request("Invalid invite code"));
            }
            if project.is_collaborator(user_id) {
                return Ok(project.clone());
            }

            project.collaborators.push(user_id);
            let snapshot = project.clone();
            state
                .associations
                .entry(user_id)
                .or_default()
                .projects_joined
                .insert(project_id);
            snapshot
        };

        tracing::info!(
            project_id = %project_id,
            user_id = %user_id,
            added_by = %requester.user_id,
            "Collaborator added"
        );
        self.sync_room(&snapshot, &[]);
        Ok(snapshot)
    }

    pub async fn join(&self, invite_code: &str, user: &AuthenticatedUser) -> CollabResult<Project> {
        let invite_code = invite_code.trim();
        if invite_code.is_empty() {
            return Err(CollabError::validation("Invite code is required"));
        }

        let mut state = self.state.write().await;
        let project_id = *state
            .active_codes
            .get(invite_code)
            .ok_or_else(|| CollabError::not_found("Invite code"))?;
        let project = state.project_mut(project_id)?;
        if project.is_collaborator(user.user_id) {
            return Err(CollabError::AlreadyMember);
        }
        project.collaborators.push(user.user_id);
        let snapshot = project.clone();

        state
            .associations
            .entry(user.user_id)
            .or_default()
            .projects_joined
            .insert(project_id);

        tracing::info!(project_id = %project_id, user_id = %user.user_id, "User joined project");
        Ok(snapshot)
    }

    /// Drops `target` from the project and forces them out of its live room.
    pub async fn remove_collaborator(
        &self,
        project_id: ProjectId,
        target: UserId,
        requester: &AuthenticatedUser,
    ) -> CollabResult<Project> {
        let snapshot = {
            let mut state = self.state.write().await;
            let project = state.project_mut(project_id)?;
            if project.is_owner(target) {
                return Err(CollabError::bad_request("Cannot remove project owner"));
            }
            authorize(requester, project, Action::RemoveCollaborator)?;
            if !project.is_collaborator(target) {
                return Err(CollabError::not_found("Collaborator"));
            }

            project.collaborators.retain(|u| *u != target);
            let snapshot = project.clone();
            state.unjoin(target, project_id);
            snapshot
        };

        tracing::info!(
            project_id = %project_id,
            user_id = %target,
            removed_by = %requester.user_id,
            "Collaborator removed"
        );

        self.sync_room(&snapshot, &[target]);
        Ok(snapshot)
    }

    pub async fn end_session(
        &self,
        project_id: ProjectId,
        requester: &AuthenticatedUser,
    ) -> CollabResult<Project> {
        let reset = {
            let mut state = self.state.write().await;
            authorize(requester, state.project_mut(project_id)?, Action::EndSession)?;
            state.reset_session(project_id)?
        };

        tracing::info!(
            project_id = %project_id,
            removed = reset.removed.len(),
            "Session ended"
        );
        self.sync_room(&reset.project, &reset.removed);
        Ok(reset.project)
    }

    /// Forces `removed` out of the project's live room, then sends the
    /// room the new project state. Call with the registry lock released.
    fn sync_room(&self, project: &Project, removed: &[UserId]) {
        for user_id in removed {
            self.hub.force_leave(project.id, *user_id);
        }
        match serde_json::to_value(project) {
            Ok(value) => self.hub.broadcast_project_update(project.id, value),
            Err(err) => tracing::warn!(error = %err, "Failed to serialize project update"),
        }
    }
}
