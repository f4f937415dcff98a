//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Outbound request to upstream:
//!     → headers.rs (strip hop-by-hop)
//! Response to caller:
//!     → headers.rs (strip hop-by-hop, add security headers)
//! ```
//!
//! Cookie stripping lives with the dispatcher (outbound) and the sanitizer
//! (inbound), where the data it protects is handled.

pub mod headers;
