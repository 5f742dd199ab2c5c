//! Session management module.
//!
//! Durable, cookie-identified sessions: the SQLite store, the in-memory cache
//! in front of it, and the periodic expiry sweeper.

mod cache;
mod clock;
mod models;
mod repository;
mod store;
mod sweeper;

pub use cache::{
    DEFAULT_ID_LENGTH, DEFAULT_TTL_SECS, MAX_TTL_SECS, MIN_ID_LENGTH, ResolvedSession, SessionCache,
    SessionCacheConfig,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use models::{OAuthIdentity, Session, SessionView};
pub use repository::SqliteSessionStore;
pub use store::SessionStore;
pub use sweeper::{DEFAULT_SWEEP_INTERVAL_SECS, spawn_sweeper};
