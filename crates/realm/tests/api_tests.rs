//! HTTP API integration tests.

use axum::{
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use chrono::Duration;
use serde_json::{Value, json};
use tower::ServiceExt;

use realm::session::SessionStore;

mod common;
use common::{COOKIE_NAME, cookie_pair, test_app};

async fn body_json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn set_cookie(response: &axum::response::Response) -> String {
    response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|h| h.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri).method(Method::GET);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = test_app().await;

    let response = app.router.oneshot(get("/health", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
    assert_eq!(json["sessions"], 0);
    assert_eq!(json["connections"], 0);
}

#[tokio::test]
async fn test_session_issued_without_cookie() {
    let app = test_app().await;

    let response = app
        .router
        .clone()
        .oneshot(get("/api/session", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let cookie = set_cookie(&response);
    assert!(cookie.starts_with(&format!("{COOKIE_NAME}=")));
    assert!(cookie.contains("HttpOnly"));
    assert!(cookie.contains("Max-Age=3600"));
    assert!(!cookie.contains("Secure"));

    let json = body_json(response).await;
    assert_eq!(json["logged_in"], false);
    assert_eq!(json["user_name"], "");
    assert!(json.get("session_id").is_none());

    let id = cookie_pair(&cookie)[COOKIE_NAME.len() + 1..].to_string();
    assert!(id.len() >= 16);
    assert!(app.store.get(&id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_session_cookie_reused_and_refreshed() {
    let app = test_app().await;

    let first = app
        .router
        .clone()
        .oneshot(get("/api/session", None))
        .await
        .unwrap();
    let pair = cookie_pair(&set_cookie(&first));
    let first_expiry = body_json(first).await["expire_at"].clone();

    app.clock.advance(Duration::minutes(30));

    let second = app
        .router
        .clone()
        .oneshot(get("/api/session", Some(&pair)))
        .await
        .unwrap();
    assert_eq!(cookie_pair(&set_cookie(&second)), pair);
    let second_expiry = body_json(second).await["expire_at"].clone();
    assert_ne!(first_expiry, second_expiry);
    assert_eq!(app.state.sessions.len().await, 1);
}

#[tokio::test]
async fn test_expired_cookie_gets_fresh_session() {
    let app = test_app().await;

    let first = app
        .router
        .clone()
        .oneshot(get("/api/session", None))
        .await
        .unwrap();
    let pair = cookie_pair(&set_cookie(&first));

    app.clock.advance(Duration::minutes(61));

    let second = app
        .router
        .clone()
        .oneshot(get("/api/session", Some(&pair)))
        .await
        .unwrap();
    assert_ne!(cookie_pair(&set_cookie(&second)), pair);

    let old_id = &pair[COOKIE_NAME.len() + 1..];
    assert!(app.store.get(old_id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_logout_clears_cookie_and_session() {
    let app = test_app().await;

    let response = app
        .router
        .clone()
        .oneshot(get("/api/session", None))
        .await
        .unwrap();
    let pair = cookie_pair(&set_cookie(&response));
    let id = pair[COOKIE_NAME.len() + 1..].to_string();

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/logout")
                .method(Method::POST)
                .header(header::COOKIE, &pair)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(set_cookie(&response).contains("Max-Age=0"));
    assert!(app.state.sessions.resolve(&id).await.is_none());
    assert!(app.store.get(&id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_peers_empty() {
    let app = test_app().await;

    let response = app.router.oneshot(get("/api/peers", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!([]));
}

#[tokio::test]
async fn test_position_requires_live_connection() {
    let app = test_app().await;

    let response = app
        .router
        .clone()
        .oneshot(get("/api/session", None))
        .await
        .unwrap();
    let pair = cookie_pair(&set_cookie(&response));

    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/position")
                .method(Method::POST)
                .header(header::COOKIE, &pair)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({"x": 3, "y": -4}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_position_without_cookie_is_bad_request() {
    let app = test_app().await;

    let response = app
        .router
        .oneshot(
            Request::builder()
                .uri("/api/position")
                .method(Method::POST)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json!({"x": 1, "y": 1}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
