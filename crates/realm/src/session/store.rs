//! Durable session storage seam.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

use super::models::Session;
use crate::error::StorageResult;

/// Durability layer behind the session cache.
///
/// All operations are idempotent. The cache is authoritative for the life of
/// the process, so callers log and tolerate every error except from
/// [`SessionStore::load_all`] at startup.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// All sessions still valid at `now`.
    async fn load_all(&self, now: DateTime<Utc>) -> StorageResult<HashMap<String, Session>>;

    /// Upsert every column of the record.
    async fn save(&self, id: &str, session: &Session) -> StorageResult<()>;

    /// Fetch one record. `None` means not found.
    async fn get(&self, id: &str) -> StorageResult<Option<Session>>;

    /// Remove one record. Absent ids are not an error.
    async fn delete(&self, id: &str) -> StorageResult<()>;

    /// Bulk-remove records expired at `now`. Returns the number removed.
    async fn delete_expired(&self, now: DateTime<Utc>) -> StorageResult<u64>;

    /// Remove every record. Returns the number removed.
    async fn delete_all(&self) -> StorageResult<u64>;
}
