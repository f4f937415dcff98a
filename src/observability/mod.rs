//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Dispatcher, sanitizer, upgrade router produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, histograms)
//!
//! Consumers:
//!     → stdout
//!     → Metrics endpoint (Prometheus scrape, opt-in)
//! ```
//!
//! # Design Decisions
//! - Request ID (x-request-id) attached by tower-http and logged per request
//! - Upstream failure causes go to logs only, never to the caller

pub mod logging;
pub mod metrics;
