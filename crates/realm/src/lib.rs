//! Realm Hub Library
//!
//! Session store, connection registry and tag-prefixed message relay for
//! simultaneously connected real-time clients.

pub mod api;
pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod session;
pub mod ws;
