//! Registry of currently reachable connections.

use futures::future::join_all;
use realm_protocol::Frame;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use super::connection::ConnectionHandle;
use super::types::{ConnectedUser, ConnectionId, PeerInfo, Position};
use crate::error::{ConnectionError, HubError};

/// Session id -> live connection.
///
/// One exclusive lock guards the map. It is held only for map access, never
/// across a write: fan-out snapshots the recipients, releases the lock, then
/// writes. Recipients whose write fails are cancelled and removed after the
/// whole fan-out.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    users: Mutex<HashMap<String, ConnectedUser>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn users(&self) -> MutexGuard<'_, HashMap<String, ConnectedUser>> {
        // Map mutations are single inserts/removes, so a poisoned map is still consistent.
        self.users.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a connection, returning the entry it displaced for the same
    /// session, if any. The caller is responsible for closing it.
    pub fn register(&self, user: ConnectedUser) -> Option<ConnectedUser> {
        let conn_id = user.connection_id();
        let previous = self.users().insert(user.session_id.clone(), user);
        info!(
            conn_id,
            replaced = previous.is_some(),
            "Registered connection"
        );
        previous
    }

    /// Remove the entry for `session_id`, whatever connection it holds.
    pub fn unregister(&self, session_id: &str) -> bool {
        match self.users().remove(session_id) {
            Some(user) => {
                info!(conn_id = user.connection_id(), "Unregistered connection");
                true
            }
            None => false,
        }
    }

    /// Remove the entry for `session_id` only if it still belongs to `conn_id`.
    pub fn unregister_connection(&self, session_id: &str, conn_id: ConnectionId) -> bool {
        let mut users = self.users();
        let owned = users
            .get(session_id)
            .is_some_and(|user| user.connection_id() == conn_id);
        if !owned {
            return false;
        }
        users.remove(session_id);
        drop(users);

        info!(conn_id, "Unregistered connection");
        true
    }

    /// Register a connection and tie its removal to the returned guard.
    ///
    /// Dropping the guard (normal return, error, or unwinding) unregisters the
    /// connection unless a newer connection has taken over the session.
    pub fn register_scoped(
        self: &Arc<Self>,
        user: ConnectedUser,
    ) -> (RegistrationGuard, Option<ConnectedUser>) {
        let guard = RegistrationGuard {
            registry: Arc::clone(self),
            session_id: user.session_id.clone(),
            connection_id: user.connection_id(),
        };
        let previous = self.register(user);
        (guard, previous)
    }

    pub fn len(&self) -> usize {
        self.users().len()
    }

    pub fn is_empty(&self) -> bool {
        self.users().is_empty()
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.users().contains_key(session_id)
    }

    /// Connection id currently registered for `session_id`.
    pub fn connection_id(&self, session_id: &str) -> Option<ConnectionId> {
        self.users().get(session_id).map(ConnectedUser::connection_id)
    }

    /// Snapshot of every entry, for diagnostics.
    pub fn snapshot(&self) -> Vec<PeerInfo> {
        self.users()
            .values()
            .map(|user| PeerInfo {
                nick: user.nick.clone(),
                position: user.position,
                connection_id: user.connection_id(),
            })
            .collect()
    }

    /// Update the application position of a connected user.
    pub fn update_position(&self, session_id: &str, x: i32, y: i32) -> Result<(), HubError> {
        let mut users = self.users();
        let user = users
            .get_mut(session_id)
            .ok_or_else(|| HubError::NotFound("live connection".to_string()))?;
        user.position = Position { x, y };
        Ok(())
    }

    /// Write `frame` to one connection. A failed write unregisters it.
    pub async fn send_to(&self, session_id: &str, frame: Frame) -> Result<(), HubError> {
        let handle = self
            .users()
            .get(session_id)
            .map(|user| user.handle.clone())
            .ok_or_else(|| HubError::NotFound("live connection".to_string()))?;

        if let Err(e) = handle.send(frame).await {
            warn!(conn_id = handle.id(), error = %e, "Send failed, dropping connection");
            handle.cancel();
            self.unregister_connection(session_id, handle.id());
            return Err(e.into());
        }
        Ok(())
    }

    /// Write `frame` to every registered connection. Returns the number of
    /// successful deliveries.
    pub async fn broadcast(&self, frame: &Frame) -> usize {
        self.fan_out(None, frame).await
    }

    /// Write `frame` to every registered connection except `sender`.
    pub async fn relay_except(&self, sender: &str, frame: &Frame) -> usize {
        self.fan_out(Some(sender), frame).await
    }

    /// Ask every connection to close. Returns how many accepted the request.
    pub fn close_all(&self, code: u16, reason: &str) -> usize {
        let handles: Vec<_> = self.users().values().map(|user| user.handle.clone()).collect();
        let closing = handles
            .iter()
            .filter(|handle| handle.close(code, reason).is_ok())
            .count();
        info!(closing, "Closing all connections");
        closing
    }

    async fn fan_out(&self, skip: Option<&str>, frame: &Frame) -> usize {
        let recipients: Vec<_> = self
            .users()
            .values()
            .filter(|user| skip != Some(user.session_id.as_str()))
            .map(|user| (user.session_id.clone(), user.handle.clone()))
            .collect();

        if recipients.is_empty() {
            return 0;
        }

        let results = join_all(recipients.into_iter().map(|(session_id, handle)| async move {
            let result = handle.send(frame.clone()).await;
            (session_id, handle, result)
        }))
        .await;

        let mut delivered = 0;
        let mut failed: Vec<(String, ConnectionHandle, ConnectionError)> = Vec::new();
        for (session_id, handle, result) in results {
            match result {
                Ok(()) => delivered += 1,
                Err(e) => failed.push((session_id, handle, e)),
            }
        }

        for (session_id, handle, e) in failed {
            warn!(conn_id = handle.id(), error = %e, "Fan-out write failed, dropping connection");
            handle.cancel();
            self.unregister_connection(&session_id, handle.id());
        }

        debug!(delivered, bytes = frame.len(), "Fan-out complete");
        delivered
    }
}

/// Scoped registration: unregisters its connection on drop.
#[derive(Debug)]
pub struct RegistrationGuard {
    registry: Arc<ConnectionRegistry>,
    session_id: String,
    connection_id: ConnectionId,
}

impl RegistrationGuard {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }
}

impl Drop for RegistrationGuard {
    fn drop(&mut self) {
        self.registry
            .unregister_connection(&self.session_id, self.connection_id);
    }
}
