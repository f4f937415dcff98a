//! Sanitizing forward proxy (v1)
//!
//! # Architecture Overview
//!
//! ```text
//!                       ┌───────────────────────────────────────────────────┐
//!                       │                   CLOAK PROXY                     │
//!                       │                                                   │
//!   GET /?url=<target>  │  ┌──────────┐   ┌────────────┐   ┌────────────┐   │
//!   ────────────────────┼─▶│ upgrade  │──▶│ dispatcher │──▶│ sanitizer  │───┼──▶ caller
//!                       │  │ router   │   │ (GET, no   │   │ (no Set-   │   │
//!                       │  └────┬─────┘   │  cookies)  │   │  Cookie,   │   │
//!                       │       │         └─────┬──────┘   │  HTML fix) │   │
//!   Upgrade: websocket  │       ▼               │          └────────────┘   │
//!   ────────────────────┼─▶ tunnel engine       ▼                           │
//!                       │   (frame relay)    upstream                       │
//!                       │                                                   │
//!   no ?url=            │  ──────────────▶ static files                     │
//!                       └───────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use cloak_proxy::config::loader::{apply_port_override, resolve_config};
use cloak_proxy::lifecycle::{signals, startup, Shutdown};
use cloak_proxy::observability::logging;

#[derive(Parser)]
#[command(name = "cloak-proxy")]
#[command(about = "Forwarding proxy that strips cookies and disables WebRTC", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen port (overrides PORT and the config file).
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = resolve_config(cli.config.as_deref())?;
    if let Some(port) = cli.port {
        apply_port_override(&mut config, Some(&port.to_string()))?;
    }

    logging::init_logging(&config.observability);

    tracing::info!("cloak-proxy v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address(),
        tunnel_enabled = config.tunnel.enabled,
        static_root = %config.static_files.root,
        upstream_timeout_secs = config.timeouts.upstream_secs,
        "Configuration loaded"
    );

    let shutdown = Shutdown::new();
    let server = startup::run(config, &shutdown);
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => result?,
        _ = signals::wait_for_signal() => {
            shutdown.trigger();
            server.await?;
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
