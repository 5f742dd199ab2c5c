//! SQLite session repository.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::collections::HashMap;

use super::models::{Session, SessionRow, format_timestamp};
use super::store::SessionStore;
use crate::error::StorageResult;

/// Repository for session persistence.
#[derive(Debug, Clone)]
pub struct SqliteSessionStore {
    pool: SqlitePool,
}

impl SqliteSessionStore {
    /// Create a new repository.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// List every stored session, expired or not, newest expiry first.
    pub async fn list(&self) -> StorageResult<Vec<(String, Session)>> {
        let rows = sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT session_id, user_id, expire_at, logged_in,
                   oauth_provider, oauth_user_id, user_name, avatar_url
            FROM session
            ORDER BY expire_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(SessionRow::into_session).collect()
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn load_all(&self, now: DateTime<Utc>) -> StorageResult<HashMap<String, Session>> {
        let rows = sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT session_id, user_id, expire_at, logged_in,
                   oauth_provider, oauth_user_id, user_name, avatar_url
            FROM session
            WHERE expire_at > ?
            "#,
        )
        .bind(format_timestamp(now))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(SessionRow::into_session).collect()
    }

    async fn save(&self, id: &str, session: &Session) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO session (
                session_id, user_id, expire_at, logged_in,
                oauth_provider, oauth_user_id, user_name, avatar_url
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(session_id) DO UPDATE SET
                user_id = excluded.user_id,
                expire_at = excluded.expire_at,
                logged_in = excluded.logged_in,
                oauth_provider = excluded.oauth_provider,
                oauth_user_id = excluded.oauth_user_id,
                user_name = excluded.user_name,
                avatar_url = excluded.avatar_url
            "#,
        )
        .bind(id)
        .bind(&session.user_id)
        .bind(format_timestamp(session.expire_at))
        .bind(session.logged_in)
        .bind(&session.oauth_provider)
        .bind(&session.oauth_user_id)
        .bind(&session.user_name)
        .bind(&session.avatar_url)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: &str) -> StorageResult<Option<Session>> {
        let row = sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT session_id, user_id, expire_at, logged_in,
                   oauth_provider, oauth_user_id, user_name, avatar_url
            FROM session
            WHERE session_id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| row.into_session().map(|(_, session)| session))
            .transpose()
    }

    async fn delete(&self, id: &str) -> StorageResult<()> {
        sqlx::query("DELETE FROM session WHERE session_id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_expired(&self, now: DateTime<Utc>) -> StorageResult<u64> {
        let result = sqlx::query("DELETE FROM session WHERE expire_at <= ?")
            .bind(format_timestamp(now))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_all(&self) -> StorageResult<u64> {
        let result = sqlx::query("DELETE FROM session")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::session::OAuthIdentity;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap()
    }

    async fn store() -> SqliteSessionStore {
        let db = Database::in_memory().await.unwrap();
        SqliteSessionStore::new(db.pool().clone())
    }

    #[tokio::test]
    async fn test_save_and_get_roundtrip_all_fields() {
        let store = store().await;
        let mut session = Session::anonymous(t0() + Duration::hours(1));
        session.log_in(OAuthIdentity {
            user_id: "usr_1".to_string(),
            provider: "github".to_string(),
            provider_user_id: "1001".to_string(),
            user_name: "grace".to_string(),
            avatar_url: "https://example.com/g.png".to_string(),
        });

        store.save("abc", &session).await.unwrap();
        let loaded = store.get("abc").await.unwrap().unwrap();
        assert_eq!(loaded, session);
    }

    #[tokio::test]
    async fn test_save_is_upsert() {
        let store = store().await;
        let mut session = Session::anonymous(t0() + Duration::hours(1));
        store.save("abc", &session).await.unwrap();

        session.user_name = "renamed".to_string();
        session.expire_at = t0() + Duration::hours(2);
        store.save("abc", &session).await.unwrap();
        store.save("abc", &session).await.unwrap();

        assert_eq!(store.list().await.unwrap().len(), 1);
        assert_eq!(store.get("abc").await.unwrap().unwrap(), session);
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let store = store().await;
        assert!(store.get("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = store().await;
        store
            .save("abc", &Session::anonymous(t0() + Duration::hours(1)))
            .await
            .unwrap();

        store.delete("abc").await.unwrap();
        store.delete("abc").await.unwrap();
        assert!(store.get("abc").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_load_all_skips_expired() {
        let store = store().await;
        store
            .save("live", &Session::anonymous(t0() + Duration::minutes(5)))
            .await
            .unwrap();
        store
            .save("dead", &Session::anonymous(t0() - Duration::minutes(5)))
            .await
            .unwrap();

        let loaded = store.load_all(t0()).await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert!(loaded.contains_key("live"));
    }

    #[tokio::test]
    async fn test_delete_expired() {
        let store = store().await;
        store
            .save("live", &Session::anonymous(t0() + Duration::minutes(5)))
            .await
            .unwrap();
        store
            .save("dead", &Session::anonymous(t0() - Duration::minutes(5)))
            .await
            .unwrap();

        assert_eq!(store.delete_expired(t0()).await.unwrap(), 1);
        assert!(store.get("dead").await.unwrap().is_none());
        assert!(store.get("live").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_delete_all() {
        let store = store().await;
        for id in ["a", "b", "c"] {
            store
                .save(id, &Session::anonymous(t0() + Duration::minutes(5)))
                .await
                .unwrap();
        }
        assert_eq!(store.delete_all().await.unwrap(), 3);
        assert!(store.list().await.unwrap().is_empty());
    }
}
