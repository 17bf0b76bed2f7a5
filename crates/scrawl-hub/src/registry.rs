//! Connection Registry
//!
//! This module tracks live authenticated connections and their room
//! memberships. The per-connection rooms sets and the per-room member index
//! are two views of the same facts and live behind a single lock, so the
//! invariant `room ∈ conn.rooms ⇔ conn ∈ index[room]` holds at every
//! observable point. Critical sections are short and never held across an
//! await.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::protocol::{RoomId, ServerFrame};

/// Outbound frame sender for one connection's writer loop
pub type FrameSender = mpsc::UnboundedSender<ServerFrame>;

/// Snapshot entry for one room member, used for a single broadcast
#[derive(Debug, Clone)]
pub struct Member {
    /// Connection id
    pub conn_id: Uuid,
    /// Authenticated user id
    pub user_id: String,
    /// Outbound sender for this member's writer loop
    pub sender: FrameSender,
}

#[derive(Debug)]
struct ConnectionEntry {
    user_id: String,
    rooms: HashSet<RoomId>,
    sender: FrameSender,
}

#[derive(Debug, Default)]
struct Inner {
    connections: HashMap<Uuid, ConnectionEntry>,
    rooms: HashMap<RoomId, HashSet<Uuid>>,
}

/// Registry of live connections and their room memberships
#[derive(Debug, Default)]
pub struct RoomRegistry {
    inner: Mutex<Inner>,
}

impl RoomRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A poisoned lock only means another handler panicked mid-section;
        // the data itself is still consistent enough to keep serving.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a freshly authenticated connection with an empty rooms set.
    ///
    /// A duplicate id is an invariant breach: the first registration wins
    /// and the caller gets [`Error::DuplicateConnection`] to log.
    pub fn register(&self, conn_id: Uuid, user_id: impl Into<String>, sender: FrameSender) -> Result<()> {
        let mut inner = self.lock();
        if inner.connections.contains_key(&conn_id) {
            return Err(Error::DuplicateConnection(conn_id));
        }

        inner.connections.insert(
            conn_id,
            ConnectionEntry {
                user_id: user_id.into(),
                rooms: HashSet::new(),
                sender,
            },
        );
        debug!(conn_id = %conn_id, total = inner.connections.len(), "connection registered");
        Ok(())
    }

    /// Add a room membership for a connection. Idempotent: joining a room
    /// twice is the same as joining it once.
    ///
    /// Returns `false` when the connection is unknown (already torn down),
    /// in which case nothing is mutated.
    pub fn join(&self, conn_id: Uuid, room: RoomId) -> bool {
        let mut inner = self.lock();
        let Some(entry) = inner.connections.get_mut(&conn_id) else {
            debug!(conn_id = %conn_id, room = %room, "join for unknown connection ignored");
            return false;
        };

        entry.rooms.insert(room);
        inner.rooms.entry(room).or_default().insert(conn_id);
        true
    }

    /// Remove a room membership for a connection. Idempotent: leaving a room
    /// that was never joined is a no-op.
    pub fn leave(&self, conn_id: Uuid, room: RoomId) {
        let mut inner = self.lock();
        if let Some(entry) = inner.connections.get_mut(&conn_id) {
            entry.rooms.remove(&room);
        }

        if let Some(members) = inner.rooms.get_mut(&room) {
            members.remove(&conn_id);
            if members.is_empty() {
                inner.rooms.remove(&room);
            }
        }
    }

    /// Whether a connection is currently joined to a room
    pub fn is_member(&self, conn_id: Uuid, room: RoomId) -> bool {
        let inner = self.lock();
        inner
            .connections
            .get(&conn_id)
            .is_some_and(|entry| entry.rooms.contains(&room))
    }

    /// Snapshot of the connections currently joined to a room.
    ///
    /// Reflects every join/leave/deregister that completed before the call;
    /// delivery against the snapshot happens outside the lock.
    pub fn members_of(&self, room: RoomId) -> Vec<Member> {
        let inner = self.lock();
        let Some(members) = inner.rooms.get(&room) else {
            return Vec::new();
        };

        members
            .iter()
            .filter_map(|conn_id| {
                inner.connections.get(conn_id).map(|entry| Member {
                    conn_id: *conn_id,
                    user_id: entry.user_id.clone(),
                    sender: entry.sender.clone(),
                })
            })
            .collect()
    }

    /// Rooms a connection is currently joined to
    pub fn rooms_of(&self, conn_id: Uuid) -> Vec<RoomId> {
        let inner = self.lock();
        inner
            .connections
            .get(&conn_id)
            .map(|entry| entry.rooms.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Remove a connection and every membership it held. Idempotent; this is
    /// the only way a connection sheds its memberships.
    pub fn deregister(&self, conn_id: Uuid) {
        let mut inner = self.lock();
        let Some(entry) = inner.connections.remove(&conn_id) else {
            return;
        };

        for room in &entry.rooms {
            if let Some(members) = inner.rooms.get_mut(room) {
                members.remove(&conn_id);
                if members.is_empty() {
                    inner.rooms.remove(room);
                }
            } else {
                warn!(conn_id = %conn_id, room = %room, "room index missing entry during deregister");
            }
        }

        debug!(
            conn_id = %conn_id,
            rooms = entry.rooms.len(),
            remaining = inner.connections.len(),
            "connection deregistered"
        );
    }

    /// Number of live connections
    pub fn connection_count(&self) -> usize {
        self.lock().connections.len()
    }

    /// Number of rooms with at least one member
    pub fn room_count(&self) -> usize {
        self.lock().rooms.len()
    }
}
