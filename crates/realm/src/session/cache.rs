//! In-memory session cache backed by a durable store.
//!
//! Every mutation hits the cache first and the store second. The cache lock is
//! never held across a store call; a failed store write is logged and the
//! cached record stays authoritative until the next sweep or restart.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::clock::Clock;
use super::models::Session;
use super::store::SessionStore;
use crate::error::StorageResult;

/// Alphanumeric charset for session ids.
const ID_ALPHABET: [char; 62] = [
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'I',
    'J', 'K', 'L', 'M', 'N', 'O', 'P', 'Q', 'R', 'S', 'T', 'U', 'V', 'W', 'X', 'Y', 'Z', 'a', 'b',
    'c', 'd', 'e', 'f', 'g', 'h', 'i', 'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r', 's', 't', 'u',
    'v', 'w', 'x', 'y', 'z',
];

/// Shortest accepted session id.
pub const MIN_ID_LENGTH: usize = 16;

/// 22 symbols of a 62-symbol alphabet carry just over 128 bits.
pub const DEFAULT_ID_LENGTH: usize = 22;

/// Default session lifetime (1 hour).
pub const DEFAULT_TTL_SECS: u64 = 3600;

/// Longest accepted session lifetime (10 years). Keeps `now + ttl` well
/// inside the four-digit years the stored timestamps sort by.
pub const MAX_TTL_SECS: u64 = 10 * 365 * 24 * 3600;

/// Session cache tuning.
#[derive(Debug, Clone)]
pub struct SessionCacheConfig {
    /// Lifetime granted on create and on every save (clamped to at most
    /// [`MAX_TTL_SECS`]).
    pub ttl: StdDuration,
    /// Length of minted ids (clamped to at least [`MIN_ID_LENGTH`]).
    pub id_length: usize,
}

impl Default for SessionCacheConfig {
    fn default() -> Self {
        Self {
            ttl: StdDuration::from_secs(DEFAULT_TTL_SECS),
            id_length: DEFAULT_ID_LENGTH,
        }
    }
}

/// Outcome of resolving a cookie value.
#[derive(Debug, Clone)]
pub struct ResolvedSession {
    pub id: String,
    pub session: Session,
    /// True when no valid session matched and a fresh one was minted.
    pub created: bool,
}

/// Shared session cache.
pub struct SessionCache {
    sessions: Mutex<HashMap<String, Session>>,
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    id_length: usize,
}

impl SessionCache {
    /// Build the cache from every non-expired stored session.
    ///
    /// Failure here is fatal for the caller (nothing to serve from).
    pub async fn load(
        store: Arc<dyn SessionStore>,
        clock: Arc<dyn Clock>,
        config: SessionCacheConfig,
    ) -> StorageResult<Self> {
        let sessions = store.load_all(clock.now()).await?;
        info!(count = sessions.len(), "Loaded sessions from store");

        let ttl = Duration::from_std(config.ttl.min(StdDuration::from_secs(MAX_TTL_SECS)))
            .unwrap_or_else(|_| Duration::seconds(DEFAULT_TTL_SECS as i64));

        Ok(Self {
            sessions: Mutex::new(sessions),
            store,
            clock,
            ttl,
            id_length: config.id_length.max(MIN_ID_LENGTH),
        })
    }

    /// Session lifetime.
    pub fn ttl(&self) -> StdDuration {
        self.ttl.to_std().unwrap_or_default()
    }

    /// Number of cached sessions (expired ones included until swept).
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Look up a session by cookie value.
    ///
    /// An expired record is evicted from cache and store and reported as
    /// absent. Resolving does not extend the expiry; [`SessionCache::save`] does.
    pub async fn resolve(&self, id: &str) -> Option<Session> {
        let now = self.clock.now();
        {
            let mut sessions = self.sessions.lock().await;
            match sessions.get(id) {
                None => return None,
                Some(session) if !session.is_expired(now) => return Some(session.clone()),
                Some(_) => {
                    sessions.remove(id);
                }
            }
        }

        debug!(session_id = %id, "Session expired, evicting");
        if let Err(e) = self.store.delete(id).await {
            warn!(session_id = %id, error = %e, "Failed to delete expired session");
        }
        None
    }

    /// Mint a fresh anonymous session.
    pub async fn create(&self) -> (String, Session) {
        let session = Session::anonymous(self.expiry());
        let id = {
            let mut sessions = self.sessions.lock().await;
            let id = loop {
                let candidate = generate_id(self.id_length);
                if !sessions.contains_key(&candidate) {
                    break candidate;
                }
            };
            sessions.insert(id.clone(), session.clone());
            id
        };

        debug!(session_id = %id, "Created anonymous session");
        self.persist(&id, &session).await;
        (id, session)
    }

    /// Resolve `cookie`, or mint a new session when it is absent or invalid.
    pub async fn resolve_or_create(&self, cookie: Option<&str>) -> ResolvedSession {
        if let Some(id) = cookie {
            if let Some(session) = self.resolve(id).await {
                return ResolvedSession {
                    id: id.to_string(),
                    session,
                    created: false,
                };
            }
            debug!(session_id = %id, "Session not found");
        }

        let (id, session) = self.create().await;
        ResolvedSession {
            id,
            session,
            created: true,
        }
    }

    /// Overwrite a session, refreshing its expiry to `now + ttl`.
    ///
    /// A record not marked logged in is stored without provider fields.
    /// Returns the record as stored.
    pub async fn save(&self, id: &str, mut session: Session) -> Session {
        if !session.logged_in {
            session.log_out();
        }
        session.expire_at = self.expiry();
        self.sessions
            .lock()
            .await
            .insert(id.to_string(), session.clone());

        self.persist(id, &session).await;
        session
    }

    /// Explicit logout.
    pub async fn remove(&self, id: &str) {
        let removed = self.sessions.lock().await.remove(id).is_some();
        debug!(session_id = %id, removed, "Removing session");

        if let Err(e) = self.store.delete(id).await {
            warn!(session_id = %id, error = %e, "Failed to delete session");
        }
    }

    /// Evict every expired session from the cache, then bulk-delete expired
    /// rows from the store. Returns the number evicted from the cache.
    pub async fn remove_expired(&self) -> usize {
        let now = self.clock.now();
        let evicted = {
            let mut sessions = self.sessions.lock().await;
            let before = sessions.len();
            sessions.retain(|_, session| !session.is_expired(now));
            before - sessions.len()
        };

        match self.store.delete_expired(now).await {
            Ok(rows) => {
                if evicted > 0 || rows > 0 {
                    info!(evicted, rows, "Removed expired sessions");
                }
            }
            Err(e) => warn!(error = %e, "Failed to delete expired sessions from store"),
        }
        evicted
    }

    fn expiry(&self) -> DateTime<Utc> {
        let now = self.clock.now();
        now.checked_add_signed(self.ttl).unwrap_or(now)
    }

    async fn persist(&self, id: &str, session: &Session) {
        if let Err(e) = self.store.save(id, session).await {
            warn!(session_id = %id, error = %e, "Failed to persist session");
        }
    }
}

fn generate_id(length: usize) -> String {
    nanoid::nanoid!(length, &ID_ALPHABET)
}
