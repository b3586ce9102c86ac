//! Registry of live rooms and the connections in them.
//!
//! Rooms are created on first join and unlinked once empty. A side index
//! maps each connection to the rooms it is in so a disconnect can clean up
//! without scanning every room. A room's lock and the index are never held
//! at the same time; the index is updated after the room call returns.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;

use super::protocol::{CursorPosition, PresenceInfo, ServerMessage};
use super::room::{ConnId, ConnectionHandle, Outcome, Room};
use crate::core::auth::AuthenticatedUser;
use crate::core::config::DEFAULT_OUTBOUND_QUEUE_CAPACITY;
use crate::core::models::{ProjectId, RoomId, UserId};

pub struct PresenceHub {
    rooms: DashMap<RoomId, Arc<Room>>,
    memberships: DashMap<ConnId, HashSet<RoomId>>,
    queue_capacity: usize,
}

impl Default for PresenceHub {
    fn default() -> Self {
        Self::new(DEFAULT_OUTBOUND_QUEUE_CAPACITY)
    }
}

impl PresenceHub {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            rooms: DashMap::new(),
            memberships: DashMap::new(),
            queue_capacity: queue_capacity.max(1),
        }
    }

    /// Register a new live connection and return its handle plus the
    /// receiving end of its outbound queue.
    pub fn connect(&self, user: AuthenticatedUser) -> (ConnectionHandle, mpsc::Receiver<ServerMessage>) {
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        let handle = ConnectionHandle::new(user, tx);
        self.memberships.insert(handle.id, HashSet::new());
        (handle, rx)
    }

    /// Returns `true` if the connection was not already in the room.
    pub fn join(&self, room_id: RoomId, handle: &ConnectionHandle) -> bool {
        loop {
            let room = self
                .rooms
                .entry(room_id)
                .or_insert_with(|| Arc::new(Room::new(room_id)))
                .clone();

            match room.join(handle) {
                Ok(outcome) => {
                    let joined = outcome.changed && room.contains(handle.id);
                    if joined {
                        self.memberships
                            .entry(handle.id)
                            .or_default()
                            .insert(room_id);
                        tracing::info!(
                            room_id = %room_id,
                            user_id = %handle.user.user_id,
                            conn_id = %handle.id,
                            "User joined room"
                        );
                    }
                    self.settle(&room, outcome);
                    return joined;
                }
                // Lost a race with the room being unlinked; drop the stale
                // entry if it is still ours and retry with a fresh room.
                Err(_) => {
                    self.rooms
                        .remove_if(&room_id, |_, current| Arc::ptr_eq(current, &room));
                }
            }
        }
    }

    pub fn leave(&self, room_id: RoomId, conn_id: ConnId) -> bool {
        let Some(room) = self.room(room_id) else {
            return false;
        };

        let outcome = room.leave(conn_id);
        let changed = outcome.changed;
        if changed {
            if let Some(mut rooms) = self.memberships.get_mut(&conn_id) {
                rooms.remove(&room_id);
            }
            tracing::info!(room_id = %room_id, conn_id = %conn_id, "Connection left room");
        }
        self.settle(&room, outcome);
        changed
    }

    /// Leave every room the connection is in and forget it.
    pub fn disconnect(&self, conn_id: ConnId) {
        let Some((_, rooms)) = self.memberships.remove(&conn_id) else {
            return;
        };

        for room_id in rooms {
            if let Some(room) = self.room(room_id) {
                let outcome = room.leave(conn_id);
                self.settle(&room, outcome);
            }
        }
        tracing::debug!(conn_id = %conn_id, "Connection disconnected");
    }

    /// Remove every connection of `user_id` from the room, telling both the
    /// removed connections and the remaining members.
    pub fn force_leave(&self, room_id: RoomId, user_id: UserId) {
        let Some(room) = self.room(room_id) else {
            return;
        };

        let (removed, outcome) = room.force_leave(user_id);
        for conn_id in &removed {
            if let Some(mut rooms) = self.memberships.get_mut(conn_id) {
                rooms.remove(&room_id);
            }
        }
        if !removed.is_empty() {
            tracing::info!(
                room_id = %room_id,
                user_id = %user_id,
                connections = removed.len(),
                "Forced user out of room"
            );
        }
        self.settle(&room, outcome);
    }

    // ========================================================================
    // Edit broadcast
    // ========================================================================

    pub fn publish_code_change(
        &self,
        room_id: RoomId,
        sender: &ConnectionHandle,
        file_name: String,
        content: String,
    ) {
        let msg = ServerMessage::CodeChange {
            project_id: room_id,
            file_name,
            content,
            sender_id: sender.user.user_id,
        };
        self.publish_from(room_id, sender.id, msg);
    }

    pub fn publish_cursor_move(&self, room_id: RoomId, sender: ConnId, position: CursorPosition) {
        let Some(room) = self.room(room_id) else {
            return;
        };
        if let Some(evicted) = room.move_cursor(sender, position) {
            self.forget(room_id, &evicted);
            self.release_if_empty(&room);
        }
    }

    pub fn publish_project_update(&self, room_id: RoomId, sender: ConnId, project: serde_json::Value) {
        self.publish_from(room_id, sender, ServerMessage::ProjectUpdate { project });
    }

    pub fn publish_meeting_update(&self, room_id: RoomId, sender: ConnId, meeting: serde_json::Value) {
        self.publish_from(room_id, sender, ServerMessage::MeetingUpdate { meeting });
    }

    /// Relay a REST save to everyone in the project room.
    pub fn notify_file_saved(
        &self,
        project_id: ProjectId,
        sender_id: UserId,
        file_name: String,
        content: String,
    ) {
        self.publish_all(
            project_id,
            ServerMessage::CodeChange {
                project_id,
                file_name,
                content,
                sender_id,
            },
        );
    }

    /// Server-originated project change, delivered to every member.
    pub fn broadcast_project_update(&self, room_id: RoomId, project: serde_json::Value) {
        self.publish_all(room_id, ServerMessage::ProjectUpdate { project });
    }

    // ========================================================================
    // Diagnostics
    // ========================================================================

    pub fn roster(&self, room_id: RoomId) -> BTreeMap<UserId, PresenceInfo> {
        self.room(room_id).map(|r| r.roster()).unwrap_or_default()
    }

    pub fn cursor(&self, room_id: RoomId, user_id: UserId) -> Option<CursorPosition> {
        self.room(room_id).and_then(|r| r.cursor(user_id))
    }

    pub fn is_member(&self, room_id: RoomId, conn_id: ConnId) -> bool {
        self.room(room_id).is_some_and(|r| r.contains(conn_id))
    }

    /// Rooms the connection is currently in.
    pub fn rooms_of(&self, conn_id: ConnId) -> HashSet<RoomId> {
        self.memberships
            .get(&conn_id)
            .map(|rooms| rooms.clone())
            .unwrap_or_default()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn connection_count(&self) -> usize {
        self.memberships.len()
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn room(&self, room_id: RoomId) -> Option<Arc<Room>> {
        self.rooms.get(&room_id).map(|r| Arc::clone(r.value()))
    }

    fn publish_from(&self, room_id: RoomId, sender: ConnId, msg: ServerMessage) {
        let Some(room) = self.room(room_id) else {
            return;
        };
        if let Some(evicted) = room.publish_from(sender, msg) {
            self.forget(room_id, &evicted);
            self.release_if_empty(&room);
        }
    }

    fn publish_all(&self, room_id: RoomId, msg: ServerMessage) {
        let Some(room) = self.room(room_id) else {
            return;
        };
        let evicted = room.publish_all(msg);
        self.forget(room_id, &evicted);
        self.release_if_empty(&room);
    }

    fn settle(&self, room: &Arc<Room>, outcome: Outcome) {
        self.forget(room.id, &outcome.evicted);
        self.release_if_empty(room);
    }

    fn forget(&self, room_id: RoomId, evicted: &[ConnId]) {
        for conn_id in evicted {
            if let Some(mut rooms) = self.memberships.get_mut(conn_id) {
                rooms.remove(&room_id);
            }
        }
    }

    fn release_if_empty(&self, room: &Arc<Room>) {
        let removed = self
            .rooms
            .remove_if(&room.id, |_, current| {
                Arc::ptr_eq(current, room) && current.try_close()
            })
            .is_some();
        if removed {
            tracing::debug!(room_id = %room.id, "Room released");
        }
    }
}
