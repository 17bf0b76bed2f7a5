//! Room Fan-out
//!
//! This module delivers frames to every connection currently joined to a
//! room. Membership is snapshotted from the registry at call time; the
//! actual enqueue onto each member's writer loop happens outside the
//! registry lock so a slow peer never blocks unrelated connections.

use std::sync::Arc;

use tracing::debug;

use crate::protocol::{RoomId, ServerFrame};
use crate::registry::RoomRegistry;

/// Fans frames out to the current member set of a room
#[derive(Debug, Clone)]
pub struct Broadcaster {
    registry: Arc<RoomRegistry>,
}

impl Broadcaster {
    /// Create a broadcaster over a registry
    #[must_use]
    pub fn new(registry: Arc<RoomRegistry>) -> Self {
        Self { registry }
    }

    /// Deliver `frame` to every connection joined to `room` at call time.
    ///
    /// Delivery per member is best-effort and isolated: a member whose
    /// writer loop has already gone away is skipped without affecting the
    /// rest, and no error reaches the sender of the original event. Returns
    /// the number of members the frame was handed to.
    pub fn broadcast(&self, room: RoomId, frame: &ServerFrame) -> usize {
        let members = self.registry.members_of(room);
        let mut delivered = 0;

        for member in &members {
            match member.sender.send(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(_) => {
                    // Receiver dropped: the connection is mid-teardown and
                    // will be deregistered by its own lifecycle guard.
                    debug!(
                        conn_id = %member.conn_id,
                        room = %room,
                        "skipping broadcast to closing connection"
                    );
                }
            }
        }

        debug!(room = %room, delivered, members = members.len(), "broadcast fanned out");
        delivered
    }
}
