//! A single project room: its live members, their cursors and the fan-out
//! of room events.
//!
//! All state sits behind one mutex. Membership changes and the fan-out they
//! trigger happen while it is held, so every member observes room events in
//! the same order. Fan-out never blocks: each member has a bounded queue fed
//! with `try_send`.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{Notify, mpsc};
use uuid::Uuid;

use super::protocol::{CursorPosition, PresenceInfo, ServerMessage};
use crate::core::auth::AuthenticatedUser;
use crate::core::models::{RoomId, UserId};

/// Identifies one live connection. A user may hold several.
pub type ConnId = Uuid;

// ============================================================================
// Connection Handle
// ============================================================================

/// Sending side of one live connection, shared by every room it is in.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub id: ConnId,
    pub user: AuthenticatedUser,
    tx: mpsc::Sender<ServerMessage>,
    evicted: Arc<Notify>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivery {
    Sent,
    Dropped,
    /// Queue full for an event that may not be dropped
    Overflowed,
    Closed,
}

impl ConnectionHandle {
    pub fn new(user: AuthenticatedUser, tx: mpsc::Sender<ServerMessage>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user,
            tx,
            evicted: Arc::new(Notify::new()),
        }
    }

    /// Queue a direct reply, waiting for space.
    pub async fn send(&self, msg: ServerMessage) -> bool {
        self.tx.send(msg).await.is_ok()
    }

    /// Resolves once the hub has evicted this connection for falling behind.
    pub async fn evicted(&self) {
        self.evicted.notified().await;
    }

    pub(crate) fn deliver(&self, msg: ServerMessage) -> Delivery {
        match self.tx.try_send(msg) {
            Ok(()) => Delivery::Sent,
            Err(mpsc::error::TrySendError::Full(msg)) if msg.is_droppable() => Delivery::Dropped,
            Err(mpsc::error::TrySendError::Full(_)) => Delivery::Overflowed,
            Err(mpsc::error::TrySendError::Closed(_)) => Delivery::Closed,
        }
    }

    fn signal_evicted(&self) {
        self.evicted.notify_one();
    }
}

// ============================================================================
// Room
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("room was closed")]
pub(crate) struct RoomClosed;

/// Result of a membership change.
#[derive(Debug, Default)]
pub(crate) struct Outcome {
    /// Whether the call changed membership
    pub changed: bool,
    /// Connections dropped for an overflowing queue during fan-out
    pub evicted: Vec<ConnId>,
}

#[derive(Debug, Default)]
struct RoomState {
    members: HashMap<ConnId, ConnectionHandle>,
    cursors: HashMap<UserId, CursorPosition>,
    /// Set once the hub has unlinked the room; joiners must retry.
    closed: bool,
}

impl RoomState {
    /// Removes a connection, and its user's cursor if no other connection of
    /// that user remains.
    fn remove_member(&mut self, conn_id: ConnId) -> Option<ConnectionHandle> {
        let member = self.members.remove(&conn_id)?;
        let user_id = member.user.user_id;
        if !self.members.values().any(|m| m.user.user_id == user_id) {
            self.cursors.remove(&user_id);
        }
        Some(member)
    }

    /// Fans `msg` out to every member except `except`.
    ///
    /// Members whose queue overflows on a non-droppable event are removed and
    /// signalled; the remaining members then get `userLeft` for them, which
    /// may cascade.
    fn dispatch(&mut self, msg: ServerMessage, except: Option<ConnId>) -> Vec<ConnId> {
        let mut evicted = Vec::new();
        let mut pending = VecDeque::from([(msg, except)]);

        while let Some((msg, except)) = pending.pop_front() {
            let lagging: Vec<ConnId> = self
                .members
                .values()
                .filter(|member| Some(member.id) != except)
                .filter_map(|member| match member.deliver(msg.clone()) {
                    Delivery::Sent | Delivery::Dropped => None,
                    Delivery::Overflowed | Delivery::Closed => Some(member.id),
                })
                .collect();

            for conn_id in lagging {
                if let Some(member) = self.remove_member(conn_id) {
                    tracing::warn!(
                        conn_id = %conn_id,
                        user_id = %member.user.user_id,
                        "Evicting connection with full outbound queue"
                    );
                    member.signal_evicted();
                    pending.push_back((
                        ServerMessage::UserLeft {
                            id: member.user.user_id,
                        },
                        None,
                    ));
                    evicted.push(conn_id);
                }
            }
        }

        evicted
    }
}

#[derive(Debug)]
pub struct Room {
    pub id: RoomId,
    state: Mutex<RoomState>,
}

impl Room {
    pub fn new(id: RoomId) -> Self {
        Self {
            id,
            state: Mutex::new(RoomState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RoomState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds `handle`, announces it to the others and hands it the roster of
    /// connections present before it.
    pub(crate) fn join(&self, handle: &ConnectionHandle) -> Result<Outcome, RoomClosed> {
        let mut state = self.lock();
        if state.closed {
            return Err(RoomClosed);
        }
        if state.members.contains_key(&handle.id) {
            return Ok(Outcome::default());
        }

        let mut evicted = state.dispatch(
            ServerMessage::UserJoined {
                id: handle.user.user_id,
                username: handle.user.username.clone(),
            },
            None,
        );

        let collaborators: BTreeMap<UserId, PresenceInfo> = state
            .members
            .values()
            .map(|m| {
                (
                    m.user.user_id,
                    PresenceInfo {
                        username: m.user.username.clone(),
                    },
                )
            })
            .collect();

        state.members.insert(handle.id, handle.clone());

        match handle.deliver(ServerMessage::InitialState { collaborators }) {
            Delivery::Sent | Delivery::Dropped => {}
            Delivery::Overflowed | Delivery::Closed => {
                state.remove_member(handle.id);
                handle.signal_evicted();
                evicted.push(handle.id);
                evicted.extend(state.dispatch(
                    ServerMessage::UserLeft {
                        id: handle.user.user_id,
                    },
                    None,
                ));
            }
        }

        Ok(Outcome {
            changed: true,
            evicted,
        })
    }

    pub(crate) fn leave(&self, conn_id: ConnId) -> Outcome {
        let mut state = self.lock();
        match state.remove_member(conn_id) {
            Some(member) => Outcome {
                changed: true,
                evicted: state.dispatch(
                    ServerMessage::UserLeft {
                        id: member.user.user_id,
                    },
                    None,
                ),
            },
            None => Outcome::default(),
        }
    }

    /// Removes every connection of `user_id` and tells them and the rest of
    /// the room. Returns the removed connections alongside the outcome.
    pub(crate) fn force_leave(&self, user_id: UserId) -> (Vec<ConnId>, Outcome) {
        let mut state = self.lock();
        let targets: Vec<ConnId> = state
            .members
            .values()
            .filter(|m| m.user.user_id == user_id)
            .map(|m| m.id)
            .collect();

        let notice = ServerMessage::UserDisconnected { id: user_id };
        for conn_id in &targets {
            if let Some(member) = state.remove_member(*conn_id) {
                // Best effort: the connection stays open, only its membership ends.
                let _ = member.deliver(notice.clone());
            }
        }

        let evicted = state.dispatch(notice, None);
        let changed = !targets.is_empty();
        (targets, Outcome { changed, evicted })
    }

    /// Fans out an event from `sender`. `None` if the sender is not a member.
    pub(crate) fn publish_from(&self, sender: ConnId, msg: ServerMessage) -> Option<Vec<ConnId>> {
        let mut state = self.lock();
        if !state.members.contains_key(&sender) {
            return None;
        }
        Some(state.dispatch(msg, Some(sender)))
    }

    /// Fans out an event originating outside the room to every member.
    pub(crate) fn publish_all(&self, msg: ServerMessage) -> Vec<ConnId> {
        self.lock().dispatch(msg, None)
    }

    pub(crate) fn move_cursor(
        &self,
        sender: ConnId,
        position: CursorPosition,
    ) -> Option<Vec<ConnId>> {
        let mut state = self.lock();
        let member = state.members.get(&sender)?;
        let user_id = member.user.user_id;
        let username = member.user.username.clone();

        state.cursors.insert(user_id, position);
        Some(state.dispatch(
            ServerMessage::CursorMove {
                user_id,
                username,
                position,
            },
            Some(sender),
        ))
    }

    /// Marks the room closed if it has no members.
    pub(crate) fn try_close(&self) -> bool {
        let mut state = self.lock();
        if state.members.is_empty() {
            state.closed = true;
        }
        state.closed
    }

    pub fn contains(&self, conn_id: ConnId) -> bool {
        self.lock().members.contains_key(&conn_id)
    }

    pub fn member_count(&self) -> usize {
        self.lock().members.len()
    }

    pub fn cursor(&self, user_id: UserId) -> Option<CursorPosition> {
        self.lock().cursors.get(&user_id).copied()
    }

    /// Users present, one entry per user.
    pub fn roster(&self) -> BTreeMap<UserId, PresenceInfo> {
        self.lock()
            .members
            .values()
            .map(|m| {
                (
                    m.user.user_id,
                    PresenceInfo {
                        username: m.user.username.clone(),
                    },
                )
            })
            .collect()
    }
}
