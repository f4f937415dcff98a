//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware)
//!     → upgrade.rs (Upgrade header? tunnel engine decides)
//!         → websocket.rs (frame relay to ws:// / wss:// target)
//!     → request.rs (target URL, outbound headers)
//!     → dispatch → sanitize
//!     → response.rs (framing headers, generic errors)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;
pub mod upgrade;
pub mod websocket;

pub use server::{HttpServer, ServerContext};
pub use upgrade::{RouteOutcome, TunnelEngine, UpgradeRouter};
pub use websocket::WebSocketTunnel;
