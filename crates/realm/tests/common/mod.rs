//! Test utilities and common setup.

#![allow(dead_code)]

use axum::Router;
use chrono::Utc;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use realm::api::{self, AppState, CookieSettings, HubSettings};
use realm::db::Database;
use realm::session::{ManualClock, SessionCache, SessionCacheConfig, SessionStore, SqliteSessionStore};
use realm::ws::ConnectionRegistry;

pub const COOKIE_NAME: &str = "realm_session";

/// Everything a test may want to poke at behind the router.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: Arc<SqliteSessionStore>,
    pub clock: Arc<ManualClock>,
    pub database: Database,
}

/// Create a test application backed by an in-memory database and a manual
/// clock.
pub async fn test_app() -> TestApp {
    let database = Database::in_memory().await.unwrap();
    let store = Arc::new(SqliteSessionStore::new(database.pool().clone()));
    let clock = Arc::new(ManualClock::new(Utc::now()));

    let sessions = SessionCache::load(
        store.clone() as Arc<dyn SessionStore>,
        clock.clone(),
        SessionCacheConfig::default(),
    )
    .await
    .unwrap();

    let cookie = CookieSettings {
        secure: false,
        ..CookieSettings::default()
    };
    let hub = HubSettings {
        send_timeout: Duration::from_secs(1),
        ..HubSettings::default()
    };

    let state = AppState::new(
        Arc::new(sessions),
        Arc::new(ConnectionRegistry::new()),
        cookie,
        hub,
    );

    TestApp {
        router: api::create_router(state.clone()),
        state,
        store,
        clock,
        database,
    }
}

/// Serve a test application on an ephemeral local port.
pub async fn spawn_server() -> (SocketAddr, TestApp) {
    let app = test_app().await;
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let router = app.router.clone();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    (addr, app)
}

/// `name=value` pair from a `Set-Cookie` header value.
pub fn cookie_pair(set_cookie: &str) -> String {
    set_cookie.split(';').next().unwrap().trim().to_string()
}

/// Poll `check` until it holds or a second passes.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
