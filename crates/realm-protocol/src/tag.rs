//! Frame tags.

use thiserror::Error;

/// Leading marker byte of a relay frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tag {
    /// `!` - heartbeat. Logged, never answered or forwarded.
    Heartbeat,
    /// `~` - rebroadcast request. Forwarded to every other peer as [`Tag::Plain`].
    Rebroadcast,
    /// `.` - plain message.
    Plain,
}

impl Tag {
    pub const HEARTBEAT: u8 = b'!';
    pub const REBROADCAST: u8 = b'~';
    pub const PLAIN: u8 = b'.';

    /// The wire byte for this tag.
    pub fn as_byte(self) -> u8 {
        match self {
            Tag::Heartbeat => Self::HEARTBEAT,
            Tag::Rebroadcast => Self::REBROADCAST,
            Tag::Plain => Self::PLAIN,
        }
    }
}

impl TryFrom<u8> for Tag {
    type Error = ProtocolError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            Self::HEARTBEAT => Ok(Tag::Heartbeat),
            Self::REBROADCAST => Ok(Tag::Rebroadcast),
            Self::PLAIN => Ok(Tag::Plain),
            other => Err(ProtocolError::UnknownTag(other)),
        }
    }
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tag::Heartbeat => write!(f, "heartbeat"),
            Tag::Rebroadcast => write!(f, "rebroadcast"),
            Tag::Plain => write!(f, "plain"),
        }
    }
}

/// Frame-level protocol violations. None of these close the connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("unknown frame tag {:?}", char::from(*.0))]
    UnknownTag(u8),
}
