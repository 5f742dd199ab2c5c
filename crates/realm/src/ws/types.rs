//! Connection-side types.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

use super::connection::ConnectionHandle;

/// Process-unique id of one accepted connection.
pub type ConnectionId = u64;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate the next connection id.
pub fn next_connection_id() -> ConnectionId {
    NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed)
}

/// Lifecycle state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closing,
    Closed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Open => write!(f, "open"),
            ConnectionState::Closing => write!(f, "closing"),
            ConnectionState::Closed => write!(f, "closed"),
        }
    }
}

/// Application position carried by a connected user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

/// One live connection, keyed in the registry by its session id.
#[derive(Debug, Clone)]
pub struct ConnectedUser {
    /// Session this connection resolved to. Weak reference: the session row
    /// may be gone.
    pub session_id: String,
    /// Nickname snapshot taken at connect time.
    pub nick: String,
    pub position: Position,
    pub handle: ConnectionHandle,
}

impl ConnectedUser {
    pub fn new(session_id: impl Into<String>, nick: impl Into<String>, handle: ConnectionHandle) -> Self {
        Self {
            session_id: session_id.into(),
            nick: nick.into(),
            position: Position::default(),
            handle,
        }
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.handle.id()
    }
}

/// Serializable snapshot of a registry entry.
#[derive(Debug, Clone, Serialize)]
pub struct PeerInfo {
    pub nick: String,
    pub position: Position,
    pub connection_id: ConnectionId,
}
