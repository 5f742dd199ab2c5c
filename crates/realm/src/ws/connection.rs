//! Per-connection writer gate.
//!
//! Every outbound frame for a connection, whether a direct reply or broadcast
//! fan-out from another connection's task, goes through one bounded queue
//! drained by a single writer task. Writes to one socket therefore never
//! interleave.

use realm_protocol::Frame;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::sync::mpsc::error::{SendTimeoutError, TrySendError};

use super::types::{ConnectionId, next_connection_id};
use crate::error::ConnectionError;

/// Default capacity of the outbound queue.
pub const DEFAULT_OUTBOUND_BUFFER: usize = 64;

/// Default bound on how long a send may wait for queue space.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Item consumed by the writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Frame(Frame),
    Close { code: u16, reason: String },
}

/// Cloneable sending side of a connection's writer gate.
///
/// Also carries a cancel flag shared by every clone: once a write through any
/// clone fails, [`ConnectionHandle::cancel`] tells the owning connection task
/// to tear the connection down.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: ConnectionId,
    tx: mpsc::Sender<Outbound>,
    send_timeout: Duration,
    cancel: Arc<watch::Sender<bool>>,
}

impl ConnectionHandle {
    /// Create a handle with a fresh connection id and the receiving end the
    /// writer task must drain.
    pub fn new(buffer: usize, send_timeout: Duration) -> (Self, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (
            Self {
                id: next_connection_id(),
                tx,
                send_timeout,
                cancel: Arc::new(watch::Sender::new(false)),
            },
            rx,
        )
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Bound on a single queued or socket write.
    pub fn send_timeout(&self) -> Duration {
        self.send_timeout
    }

    /// Queue a frame, waiting at most the send timeout for space.
    pub async fn send(&self, frame: Frame) -> Result<(), ConnectionError> {
        self.tx
            .send_timeout(Outbound::Frame(frame), self.send_timeout)
            .await
            .map_err(|e| match e {
                SendTimeoutError::Timeout(_) => ConnectionError::Timeout,
                SendTimeoutError::Closed(_) => ConnectionError::Closed,
            })
    }

    /// Ask the writer to send a close frame and stop. Never waits.
    pub fn close(&self, code: u16, reason: impl Into<String>) -> Result<(), ConnectionError> {
        self.tx
            .try_send(Outbound::Close {
                code,
                reason: reason.into(),
            })
            .map_err(|e| match e {
                TrySendError::Full(_) => ConnectionError::Timeout,
                TrySendError::Closed(_) => ConnectionError::Closed,
            })
    }

    /// True once the writer task has dropped its receiver.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Mark the connection failed. The connection task ends on the next poll.
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Resolves once [`ConnectionHandle::cancel`] has been called on any clone.
    pub async fn cancelled(&self) {
        let mut rx = self.cancel.subscribe();
        // The sender lives as long as `self`, so this only returns once set.
        rx.wait_for(|cancelled| *cancelled).await.ok();
    }
}
