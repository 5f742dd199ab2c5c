//! Hub error types.

use thiserror::Error;

pub use realm_protocol::ProtocolError;

/// Result type for session persistence operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Persistence failures. Logged and tolerated everywhere except at startup.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database backend error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A persisted timestamp could not be parsed.
    #[error("invalid timestamp {value:?}: {source}")]
    Timestamp {
        value: String,
        #[source]
        source: chrono::ParseError,
    },
}

/// Read or write failure on a live connection. Always ends in unregistration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    /// The peer closed with a normal-closure code.
    #[error("connection closed normally")]
    NormalClosure,

    /// The writer gate is gone (socket writer exited).
    #[error("connection closed")]
    Closed,

    /// The outbound queue stayed full past the send timeout.
    #[error("send timed out")]
    Timeout,

    /// A write to this connection failed and the hub dropped it.
    #[error("dropped after a failed write")]
    Dropped,

    /// Transport-level failure.
    #[error("transport error: {0}")]
    Transport(String),
}

impl ConnectionError {
    /// Normal closure is the success path and is logged at a lower severity.
    pub fn is_normal(&self) -> bool {
        matches!(self, ConnectionError::NormalClosure)
    }
}

/// Top-level hub error taxonomy.
#[derive(Debug, Error)]
pub enum HubError {
    /// Session or connection absent.
    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = HubError::NotFound("connection abc".to_string());
        assert_eq!(err.to_string(), "not found: connection abc");

        let err: HubError = ProtocolError::UnknownTag(b'x').into();
        assert_eq!(err.to_string(), "unknown frame tag 'x'");
    }

    #[test]
    fn test_normal_closure_is_distinguished() {
        assert!(ConnectionError::NormalClosure.is_normal());
        assert!(!ConnectionError::Closed.is_normal());
        assert!(!ConnectionError::Transport("reset".into()).is_normal());
    }
}
