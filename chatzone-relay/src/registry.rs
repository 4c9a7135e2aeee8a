//! Connection registry for the relay server.
//!
//! Tracks which WebSocket connection is joined to which room under which
//! display name, along with the channel used to reach it. A connection
//! appears at most once; re-joining replaces the previous entry. Entries are
//! ephemeral — lost on relay restart.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::extract::ws::Message;
use tokio::sync::{RwLock, mpsc};

/// Identity of one WebSocket connection, assigned by the relay at accept
/// time. Never derived from anything the client sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnId(u64);

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// One joined connection: its room, display name, and outbound channel.
///
/// The registry holds a clone of the mpsc sender feeding the connection's
/// WebSocket writer task; the writer task owns the socket half, so dropping
/// a registry entry never closes the socket.
#[derive(Debug, Clone)]
pub struct Participant {
    /// Connection this entry belongs to.
    pub conn: ConnId,
    /// Room the connection is joined to.
    pub room: String,
    /// Display name announced to other room members.
    pub username: String,
    /// Channel for delivering outbound frames to this connection.
    pub sender: mpsc::UnboundedSender<Message>,
}

/// In-memory registry of all currently joined connections.
///
/// A single coarse [`RwLock`] makes each operation atomic with respect to
/// the others, and [`Registry::members_of`] hands out snapshots so fan-out
/// iteration never observes a concurrent mutation. Entries keep insertion
/// order, which keeps fan-out order deterministic.
pub struct Registry {
    participants: RwLock<Vec<Participant>>,
    next_conn_id: AtomicU64,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Creates a new, empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            participants: RwLock::new(Vec::new()),
            next_conn_id: AtomicU64::new(1),
        }
    }

    /// Allocates an identity for a newly accepted connection.
    pub fn next_conn_id(&self) -> ConnId {
        ConnId(self.next_conn_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Inserts a participant, replacing any existing entry for the same
    /// connection.
    ///
    /// The new entry goes to the end of the iteration order, so a re-joining
    /// connection is announced after the members that were already present.
    /// Callers validate that `room` and `username` are non-empty before
    /// calling.
    pub async fn upsert(&self, participant: Participant) {
        let mut participants = self.participants.write().await;
        participants.retain(|p| p.conn != participant.conn);
        participants.push(participant);
    }

    /// Returns the entry for a connection, if it has joined.
    pub async fn find(&self, conn: ConnId) -> Option<Participant> {
        let participants = self.participants.read().await;
        participants.iter().find(|p| p.conn == conn).cloned()
    }

    /// Removes and returns the entry for a connection.
    ///
    /// `None` is a normal outcome for connections that disconnect before
    /// ever joining.
    pub async fn remove(&self, conn: ConnId) -> Option<Participant> {
        let mut participants = self.participants.write().await;
        let index = participants.iter().position(|p| p.conn == conn)?;
        Some(participants.remove(index))
    }

    /// Returns a snapshot of all participants in a room, in insertion order.
    ///
    /// Fan-out iterates the snapshot, so send failures or concurrent
    /// registry mutations cannot corrupt the target set.
    pub async fn members_of(&self, room: &str) -> Vec<Participant> {
        let participants = self.participants.read().await;
        participants
            .iter()
            .filter(|p| p.room == room)
            .cloned()
            .collect()
    }

    /// Returns the number of joined connections.
    pub async fn len(&self) -> usize {
        let participants = self.participants.read().await;
        participants.len()
    }

    /// Returns `true` if no connection has joined.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
