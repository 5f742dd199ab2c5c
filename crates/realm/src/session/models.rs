//! Session data models.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::StorageError;

/// Identity attached to a session by a successful OAuth callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthIdentity {
    pub user_id: String,
    pub provider: String,
    pub provider_user_id: String,
    pub user_name: String,
    pub avatar_url: String,
}

/// A durable, TTL-bound session record. The id is the map/table key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Owning identity. Empty for anonymous sessions.
    pub user_id: String,
    /// Instant after which the session is no longer valid.
    pub expire_at: DateTime<Utc>,
    pub logged_in: bool,
    pub oauth_provider: String,
    pub oauth_user_id: String,
    /// Display name.
    pub user_name: String,
    pub avatar_url: String,
}

impl Session {
    /// Anonymous placeholder session valid until `expire_at`.
    pub fn anonymous(expire_at: DateTime<Utc>) -> Self {
        Self {
            user_id: String::new(),
            expire_at,
            logged_in: false,
            oauth_provider: String::new(),
            oauth_user_id: String::new(),
            user_name: String::new(),
            avatar_url: String::new(),
        }
    }

    /// Expired sessions must never be handed out.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expire_at <= now
    }

    /// Upgrade in place after an OAuth callback.
    pub fn log_in(&mut self, identity: OAuthIdentity) {
        self.logged_in = true;
        self.user_id = identity.user_id;
        self.oauth_provider = identity.provider;
        self.oauth_user_id = identity.provider_user_id;
        self.user_name = identity.user_name;
        self.avatar_url = identity.avatar_url;
    }

    /// Drop the identity-provider fields, keeping the session itself.
    pub fn log_out(&mut self) {
        self.logged_in = false;
        self.oauth_provider.clear();
        self.oauth_user_id.clear();
    }

    /// Nickname snapshot used for a new connection.
    pub fn nick(&self) -> &str {
        if self.user_name.is_empty() {
            "anonymous"
        } else {
            &self.user_name
        }
    }
}

/// Public projection of a session (never includes the id).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionView {
    pub logged_in: bool,
    pub user_id: String,
    pub user_name: String,
    pub avatar_url: String,
    pub oauth_provider: String,
    pub expire_at: DateTime<Utc>,
}

impl From<&Session> for SessionView {
    fn from(session: &Session) -> Self {
        Self {
            logged_in: session.logged_in,
            user_id: session.user_id.clone(),
            user_name: session.user_name.clone(),
            avatar_url: session.avatar_url.clone(),
            oauth_provider: session.oauth_provider.clone(),
            expire_at: session.expire_at,
        }
    }
}

/// Row shape of the `session` table.
#[derive(Debug, Clone, FromRow)]
pub(crate) struct SessionRow {
    pub session_id: String,
    pub user_id: String,
    pub expire_at: String,
    pub logged_in: bool,
    pub oauth_provider: String,
    pub oauth_user_id: String,
    pub user_name: String,
    pub avatar_url: String,
}

impl SessionRow {
    pub fn into_session(self) -> Result<(String, Session), StorageError> {
        let expire_at = parse_timestamp(&self.expire_at)?;
        Ok((
            self.session_id,
            Session {
                user_id: self.user_id,
                expire_at,
                logged_in: self.logged_in,
                oauth_provider: self.oauth_provider,
                oauth_user_id: self.oauth_user_id,
                user_name: self.user_name,
                avatar_url: self.avatar_url,
            },
        ))
    }
}

/// Fixed-width UTC rendering; lexical order equals chronological order.
pub(crate) fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(value)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|source| StorageError::Timestamp {
            value: value.to_string(),
            source,
        })
}
