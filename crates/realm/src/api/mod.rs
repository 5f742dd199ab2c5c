//! HTTP API module.
//!
//! Thin glue around the hub: session cookie endpoints, peer diagnostics,
//! health and the WebSocket upgrade route.

mod cookie;
mod error;
mod handlers;
mod routes;
mod state;

pub use cookie::{CookieSettings, DEFAULT_COOKIE_NAME};
pub use error::{ApiError, ApiResult, ErrorResponse};
pub use handlers::HealthResponse;
pub use routes::create_router;
pub use state::{AppState, HubSettings};
