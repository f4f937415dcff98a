//! Metrics collection and exposition.
//!
//! # Metrics
//! - `cloak_proxy_requests_total` (counter): proxied requests by outcome, status
//! - `cloak_proxy_request_duration_seconds` (histogram): proxy latency by outcome
//! - `cloak_proxy_sanitize_total` (counter): body handling by result
//! - `cloak_proxy_set_cookie_stripped_total` (counter): dropped Set-Cookie headers
//! - `cloak_proxy_tunnel_upgrades_total` (counter): upgrade decisions by outcome
//!
//! Recording is a no-op until `init_metrics` installs the Prometheus recorder.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

/// Record a finished proxy request.
pub fn record_request(outcome: &'static str, status: u16, start: Instant) {
    counter!(
        "cloak_proxy_requests_total",
        "outcome" => outcome,
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("cloak_proxy_request_duration_seconds", "outcome" => outcome)
        .record(start.elapsed().as_secs_f64());
}

/// Record how a response body was handled: injected, passthrough or fallback.
pub fn record_sanitize(result: &'static str) {
    counter!("cloak_proxy_sanitize_total", "result" => result).increment(1);
}

/// Record Set-Cookie headers removed from an upstream response.
pub fn record_set_cookie_stripped(count: usize) {
    if count > 0 {
        counter!("cloak_proxy_set_cookie_stripped_total").increment(count as u64);
    }
}

/// Record an upgrade routing decision.
pub fn record_tunnel_upgrade(outcome: &'static str) {
    counter!("cloak_proxy_tunnel_upgrades_total", "outcome" => outcome).increment(1);
}
