//! Connection-upgrade routing.
//!
//! # Responsibilities
//! - Recognize requests asking for a protocol upgrade
//! - Ask the tunnel engine whether it wants the connection
//! - Hand matching requests to the engine; leave the rest untouched
//!
//! # Data Flow
//! ```text
//! Request with Upgrade header
//!     → TunnelEngine::should_route
//!         true  → TunnelEngine::route_upgrade → handshake response
//!         false → next layer (ordinary HTTP handling)
//! ```
//!
//! The router has no error path of its own. Whatever the engine returns is
//! what the caller sees.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{header, HeaderMap};
use axum::middleware::Next;
use axum::response::Response;
use futures_util::future::BoxFuture;

use crate::http::server::ServerContext;
use crate::observability::metrics;

/// A transport relay that can take over upgraded connections.
pub trait TunnelEngine: Send + Sync + 'static {
    /// Whether this engine wants the upgrade request.
    fn should_route(&self, request: &Request) -> bool;

    /// Complete the upgrade. The request still carries the pending connection
    /// (and any bytes hyper already buffered); the engine owns it from here.
    fn route_upgrade(&self, request: Request) -> BoxFuture<'static, Response>;
}

/// Result of routing one request.
pub enum RouteOutcome {
    /// The engine took the connection; this is its handshake response.
    Tunneled(Response),
    /// Not for the tunnel; the request is returned unchanged.
    Declined(Request),
}

impl RouteOutcome {
    /// Whether the tunnel handled the request.
    pub fn handled(&self) -> bool {
        matches!(self, RouteOutcome::Tunneled(_))
    }
}

/// Whether the headers ask for a connection upgrade.
pub fn is_upgrade_request(headers: &HeaderMap) -> bool {
    headers.contains_key(header::UPGRADE)
        && headers
            .get_all(header::CONNECTION)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .any(|token| token.trim().eq_ignore_ascii_case("upgrade"))
}

/// Routes upgrade requests to an optional tunnel engine.
#[derive(Clone, Default)]
pub struct UpgradeRouter {
    engine: Option<Arc<dyn TunnelEngine>>,
}

impl UpgradeRouter {
    /// Router delegating to `engine`.
    pub fn new(engine: Arc<dyn TunnelEngine>) -> Self {
        Self {
            engine: Some(engine),
        }
    }

    /// Router that declines everything.
    pub fn disabled() -> Self {
        Self { engine: None }
    }

    /// Route one request.
    pub async fn route(&self, request: Request) -> RouteOutcome {
        if !is_upgrade_request(request.headers()) {
            return RouteOutcome::Declined(request);
        }

        match &self.engine {
            Some(engine) if engine.should_route(&request) => {
                tracing::debug!(path = %request.uri().path(), "Handing upgrade to tunnel engine");
                metrics::record_tunnel_upgrade("tunneled");
                RouteOutcome::Tunneled(engine.route_upgrade(request).await)
            }
            _ => {
                metrics::record_tunnel_upgrade("declined");
                RouteOutcome::Declined(request)
            }
        }
    }
}

/// Middleware placed in front of the HTTP pipeline.
pub async fn upgrade_middleware(
    State(ctx): State<ServerContext>,
    request: Request,
    next: Next,
) -> Response {
    match ctx.upgrades.route(request).await {
        RouteOutcome::Tunneled(response) => response,
        RouteOutcome::Declined(request) => next.run(request).await,
    }
}
