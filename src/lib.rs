//! Sanitizing forward proxy library.
//!
//! Fetches a caller-supplied URL, drops cookies in both directions, injects a
//! WebRTC countermeasure into HTML pages and relays WebSocket upgrades to a
//! tunnel engine.

pub mod config;
pub mod dispatch;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod sanitize;
pub mod security;

pub use config::schema::ProxyConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
