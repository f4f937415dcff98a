//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build the server context once and share it with every handler
//! - Create the Axum router: upgrade routing, proxy pipeline, static fallback
//! - Wire up middleware (tracing, request ID, limits, security headers)
//! - Serve until shutdown
//!
//! # Layer Order (outermost first)
//! ```text
//! SetRequestId → Trace → PropagateRequestId → Timeout → BodyLimit
//!     → security headers → upgrade router → proxy pipeline → static files
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    services::ServeDir,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::ProxyConfig;
use crate::dispatch::{DispatchError, Dispatcher};
use crate::http::request::target_url;
use crate::http::response::proxy_error;
use crate::http::upgrade::{upgrade_middleware, TunnelEngine, UpgradeRouter};
use crate::http::websocket::WebSocketTunnel;
use crate::lifecycle::shutdown;
use crate::observability::metrics;
use crate::sanitize::sanitize;
use crate::security::headers::apply_security_headers;

/// Shared state for the HTTP pipeline and the upgrade hook.
///
/// Built once at startup; cloning only bumps reference counts.
#[derive(Clone)]
pub struct ServerContext {
    pub config: Arc<ProxyConfig>,
    pub dispatcher: Arc<Dispatcher>,
    pub upgrades: UpgradeRouter,
}

impl ServerContext {
    /// Context with the tunnel engine chosen by configuration.
    pub fn new(config: ProxyConfig) -> Result<Self, DispatchError> {
        let engine = config
            .tunnel
            .enabled
            .then(|| Arc::new(WebSocketTunnel::new(&config.tunnel)) as Arc<dyn TunnelEngine>);
        Self::with_tunnel_engine(config, engine)
    }

    /// Context with an explicit tunnel engine (or none).
    pub fn with_tunnel_engine(
        config: ProxyConfig,
        engine: Option<Arc<dyn TunnelEngine>>,
    ) -> Result<Self, DispatchError> {
        let dispatcher = Dispatcher::new(&config.forward, &config.timeouts)?;
        let upgrades = match engine {
            Some(engine) => UpgradeRouter::new(engine),
            None => UpgradeRouter::disabled(),
        };
        Ok(Self {
            config: Arc::new(config),
            dispatcher: Arc::new(dispatcher),
            upgrades,
        })
    }
}

/// HTTP server for the sanitizing proxy.
pub struct HttpServer {
    router: Router,
    context: ServerContext,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: ProxyConfig) -> Result<Self, DispatchError> {
        Ok(Self::from_context(ServerContext::new(config)?))
    }

    /// Create a server around an existing context.
    pub fn from_context(context: ServerContext) -> Self {
        let router = build_router(context.clone());
        Self { router, context }
    }

    /// The fully layered router, for driving the server without a socket.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ProxyConfig {
        &self.context.config
    }

    /// Run the server, accepting connections until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown::wait(shutdown))
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Build the Axum router with all middleware layers.
#[allow(deprecated)]
fn build_router(ctx: ServerContext) -> Router {
    let config = ctx.config.clone();

    let router = if config.static_files.enabled {
        Router::new().fallback_service(ServeDir::new(&config.static_files.root))
    } else {
        Router::new().fallback(not_found)
    };

    let router = router
        .layer(middleware::from_fn_with_state(ctx.clone(), proxy_middleware))
        .layer(middleware::from_fn_with_state(ctx, upgrade_middleware));

    let router = if config.security.enable_headers {
        apply_security_headers(router)
    } else {
        router
    };

    router
        .layer(RequestBodyLimitLayer::new(config.security.max_request_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(config.timeouts.request_secs)))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http().make_span_with(|request: &Request| {
            let request_id = request
                .headers()
                .get("x-request-id")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("unknown");
            tracing::info_span!(
                "request",
                method = %request.method(),
                path = %request.uri().path(),
                request_id = %request_id,
            )
        }))
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

/// Proxy pipeline: dispatch, sanitize, respond.
/// Requests without a target fall through to the next handler.
async fn proxy_middleware(
    State(ctx): State<ServerContext>,
    request: Request,
    next: Next,
) -> Response {
    let Some(target) = target_url(request.uri(), &ctx.config.forward.target_param) else {
        return next.run(request).await;
    };

    let start_time = Instant::now();
    match ctx.dispatcher.dispatch(&target, request.headers()).await {
        Ok(upstream) => {
            let sanitized = sanitize(upstream);
            tracing::debug!(
                status = %sanitized.status,
                body = sanitized.outcome.as_str(),
                "Proxied response"
            );
            metrics::record_request("proxied", sanitized.status.as_u16(), start_time);
            sanitized.into_response()
        }
        Err(e) => {
            tracing::error!(url = %target, kind = e.kind(), error = %e, "Proxy error");
            metrics::record_request("upstream_error", StatusCode::INTERNAL_SERVER_ERROR.as_u16(), start_time);
            proxy_error()
        }
    }
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Not Found")
}
