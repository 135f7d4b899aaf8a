//! Conversation rooms
//!
//! A room id is a conversation id. Each live connection that joined a room is
//! registered with its outbound channel; fan-out encodes an event once and
//! hands the frame to every member's channel without waiting on slow peers.

use dashmap::DashMap;
use miramatch_shared::{encode_frame, SenderType, ServerEvent};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Process-unique id of one websocket connection
pub type ConnectionId = u64;

/// A connection registered in a room
#[derive(Debug, Clone)]
pub struct RoomMember {
    pub participant_id: String,
    pub sender_type: SenderType,
    pub tx: mpsc::Sender<Vec<u8>>,
}

/// Room registry: conversation id → members by connection
#[derive(Default)]
pub struct Rooms {
    rooms: DashMap<String, HashMap<ConnectionId, RoomMember>>,
}

impl Rooms {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to a room. Joining twice is a no-op.
    pub fn join(&self, room: &str, conn: ConnectionId, member: RoomMember) {
        self.rooms
            .entry(room.to_string())
            .or_default()
            .entry(conn)
            .or_insert(member);
    }

    /// Remove a connection from a room. Returns whether it was a member.
    pub fn leave(&self, room: &str, conn: ConnectionId) -> bool {
        let removed = match self.rooms.get_mut(room) {
            Some(mut members) => members.remove(&conn).is_some(),
            None => false,
        };
        self.rooms.remove_if(room, |_, members| members.is_empty());
        removed
    }

    /// Remove a connection from every room it joined
    pub fn leave_all<'a>(&self, rooms: impl IntoIterator<Item = &'a String>, conn: ConnectionId) {
        for room in rooms {
            self.leave(room, conn);
        }
    }

    /// Whether any connection of the given side is currently in the room
    pub fn has_side(&self, room: &str, side: SenderType) -> bool {
        self.rooms
            .get(room)
            .map(|members| members.values().any(|m| m.sender_type == side))
            .unwrap_or(false)
    }

    pub fn member_count(&self, room: &str) -> usize {
        self.rooms.get(room).map(|m| m.len()).unwrap_or(0)
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Send an event to every member of a room, optionally skipping one
    /// connection. Returns the number of members the frame was queued for.
    pub fn broadcast(&self, room: &str, event: &ServerEvent, except: Option<ConnectionId>) -> usize {
        let frame = match encode_frame(event) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Dropping event for room {}: {}", short(room), e);
                return 0;
            }
        };

        // Snapshot the senders so no map guard is held while sending
        let targets: Vec<(ConnectionId, mpsc::Sender<Vec<u8>>)> = match self.rooms.get(room) {
            Some(members) => members
                .iter()
                .filter(|(id, _)| Some(**id) != except)
                .map(|(id, m)| (*id, m.tx.clone()))
                .collect(),
            None => return 0,
        };

        let mut delivered = 0;
        for (conn, tx) in targets {
            match tx.try_send(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!("Outbound buffer full for connection {}, frame dropped", conn);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!("Connection {} closed before fan-out", conn);
                }
            }
        }
        delivered
    }
}

/// First 8 characters of an id, for logs
pub fn short(id: &str) -> &str {
    match id.char_indices().nth(8) {
        Some((idx, _)) => &id[..idx],
        None => id,
    }
}
