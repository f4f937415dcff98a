//! Startup orchestration.
//!
//! Fail fast: any startup error is fatal. Metrics come up before the
//! listener so traffic is only accepted once the process is observable.

use std::net::SocketAddr;

use tokio::net::TcpListener;

use crate::config::ProxyConfig;
use crate::dispatch::DispatchError;
use crate::http::HttpServer;
use crate::lifecycle::Shutdown;
use crate::observability::metrics;

/// Error type for startup.
#[derive(Debug)]
pub enum StartupError {
    /// The upstream HTTP client could not be built.
    Client(DispatchError),
    /// Failed to bind or serve on the listener.
    Io(std::io::Error),
}

impl std::fmt::Display for StartupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StartupError::Client(e) => write!(f, "Failed to build upstream client: {}", e),
            StartupError::Io(e) => write!(f, "Listener error: {}", e),
        }
    }
}

impl std::error::Error for StartupError {}

/// Bring the proxy up and serve until `shutdown` fires.
pub async fn run(config: ProxyConfig, shutdown: &Shutdown) -> Result<(), StartupError> {
    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let server = HttpServer::new(config.clone()).map_err(StartupError::Client)?;

    let listener = TcpListener::bind(config.listener.bind_address())
        .await
        .map_err(StartupError::Io)?;
    let local_addr = listener.local_addr().map_err(StartupError::Io)?;

    tracing::info!(
        address = %local_addr,
        tunnel_prefix = %config.tunnel.path_prefix,
        "Proxy listening"
    );

    server
        .run(listener, shutdown.subscribe())
        .await
        .map_err(StartupError::Io)
}
