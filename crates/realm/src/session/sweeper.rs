//! Background eviction of expired sessions.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::cache::SessionCache;

/// Default sweep period (5 minutes).
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 300;

/// Start the periodic sweeper.
///
/// The first sweep runs one full `interval` after start. The task exits when
/// `shutdown` flips to `true` or its sender is dropped.
pub fn spawn_sweeper(
    cache: Arc<SessionCache>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    info!(interval_secs = interval.as_secs(), "Starting session sweeper");

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let evicted = cache.remove_expired().await;
                    debug!(evicted, "Session sweep complete");
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Session sweeper shutting down");
                        break;
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::session::{
        ManualClock, SessionCacheConfig, SessionStore, SqliteSessionStore,
    };
    use chrono::{TimeZone, Utc};

    #[tokio::test]
    async fn test_sweeper_evicts_and_stops() {
        let db = Database::in_memory().await.unwrap();
        let store = Arc::new(SqliteSessionStore::new(db.pool().clone()));
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        ));
        let cache = Arc::new(
            SessionCache::load(store.clone(), clock.clone(), SessionCacheConfig::default())
                .await
                .unwrap(),
        );
        let (id, _) = cache.create().await;
        clock.advance(chrono::Duration::hours(2));

        let (tx, rx) = watch::channel(false);
        let handle = spawn_sweeper(cache.clone(), Duration::from_millis(50), rx);

        for _ in 0..100 {
            if cache.is_empty().await && store.get(&id).await.unwrap().is_none() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(cache.is_empty().await);
        assert!(store.get(&id).await.unwrap().is_none());

        tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
