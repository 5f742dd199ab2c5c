//! Application state shared across handlers.

use std::sync::Arc;
use std::time::Duration;

use crate::session::SessionCache;
use crate::ws::{ConnectionRegistry, DEFAULT_OUTBOUND_BUFFER, DEFAULT_SEND_TIMEOUT};

use super::cookie::CookieSettings;

/// WebSocket transport settings.
#[derive(Debug, Clone)]
pub struct HubSettings {
    /// Capacity of each connection's outbound queue.
    pub outbound_buffer: usize,
    /// How long a write may wait for queue space before the recipient fails.
    pub send_timeout: Duration,
    /// Origins allowed to make credentialed cross-origin requests.
    pub allowed_origins: Arc<[String]>,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            outbound_buffer: DEFAULT_OUTBOUND_BUFFER,
            send_timeout: DEFAULT_SEND_TIMEOUT,
            allowed_origins: Arc::from(vec!["*".to_string()]),
        }
    }
}

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Session cache (store-backed).
    pub sessions: Arc<SessionCache>,
    /// Live connections.
    pub registry: Arc<ConnectionRegistry>,
    /// Session cookie naming and attributes.
    pub cookie: Arc<CookieSettings>,
    pub hub: HubSettings,
}

impl AppState {
    pub fn new(
        sessions: Arc<SessionCache>,
        registry: Arc<ConnectionRegistry>,
        cookie: CookieSettings,
        hub: HubSettings,
    ) -> Self {
        Self {
            sessions,
            registry,
            cookie: Arc::new(cookie),
            hub,
        }
    }
}
