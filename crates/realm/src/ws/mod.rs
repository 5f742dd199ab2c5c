//! WebSocket hub module.
//!
//! Provides the live connection side of the hub:
//! - Registry of connected users keyed by session id
//! - Per-connection writer gate (bounded queue, single writer task)
//! - Tag-byte relay for inbound frames
//! - Connection lifecycle from upgrade to unregistration

mod connection;
mod handler;
mod registry;
pub mod relay;
mod types;

pub use connection::{ConnectionHandle, DEFAULT_OUTBOUND_BUFFER, DEFAULT_SEND_TIMEOUT, Outbound};
pub use handler::ws_handler;
pub use registry::{ConnectionRegistry, RegistrationGuard};
pub use relay::{RelayOutcome, handle_frame};
pub use types::{ConnectedUser, ConnectionId, ConnectionState, PeerInfo, Position};
