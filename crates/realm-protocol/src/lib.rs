//! Relay frame protocol.
//!
//! A frame is one leading tag byte followed by an opaque application payload:
//!
//! ```text
//! +-----+---------------------------+
//! | tag | payload (N >= 0 bytes)    |
//! +-----+---------------------------+
//! ```
//!
//! The hub only ever looks at the tag. Payload bytes are interpreted by peers.

mod frame;
mod tag;

pub use frame::{Frame, FrameKind};
pub use tag::{ProtocolError, Tag};
