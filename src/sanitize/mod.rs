//! Content sanitizer.
//!
//! # Data Flow
//! ```text
//! UpstreamResponse
//!     → headers.rs (drop every Set-Cookie)
//!     → content-type gate (text/html?)
//!         yes → decode (lossy UTF-8) → html.rs (append fragment to <head>)
//!               → Content-Type charset set to utf-8
//!               on failure → original body (fallback)
//!         no  → body unchanged
//!     → SanitizedResponse (status unchanged)
//! ```
//!
//! # Design Decisions
//! - Header filtering is a pure function over header maps
//! - HTML rewriting is best-effort; the fallback is an explicit outcome
//! - Non-HTML bodies are never decoded, so they pass through byte-for-byte

pub mod headers;
pub mod html;

use std::borrow::Cow;

use axum::body::Bytes;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use thiserror::Error;

use crate::dispatch::UpstreamResponse;
use crate::observability::metrics;

pub use headers::filter_headers;
pub use html::{inject_fragment, INJECTION_FRAGMENT};

/// Why an HTML body could not be rewritten.
#[derive(Debug, Error)]
pub enum SanitizeError {
    #[error("document head could not be located in serialized output")]
    HeadNotFound,
}

/// What happened to the body during sanitization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyOutcome {
    /// HTML body rewritten with the fragment.
    Injected,
    /// Not HTML; body untouched.
    Passthrough,
    /// HTML body that could not be rewritten; forwarded untouched.
    Fallback,
}

impl BodyOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            BodyOutcome::Injected => "injected",
            BodyOutcome::Passthrough => "passthrough",
            BodyOutcome::Fallback => "fallback",
        }
    }
}

/// Response ready to be written back to the caller.
#[derive(Debug, Clone)]
pub struct SanitizedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub outcome: BodyOutcome,
}

/// Strip cookies from `upstream` and rewrite HTML bodies.
pub fn sanitize(upstream: UpstreamResponse) -> SanitizedResponse {
    let mut headers = filter_headers(&upstream.headers);
    metrics::record_set_cookie_stripped(headers::set_cookie_count(&upstream.headers));

    let (body, outcome) = if upstream.is_html() {
        match rewrite_html(&upstream.body) {
            Ok(rewritten) => {
                if let Some(content_type) = upstream.content_type.as_deref() {
                    if let Ok(value) = HeaderValue::from_str(&with_utf8_charset(content_type)) {
                        headers.insert(header::CONTENT_TYPE, value);
                    }
                }
                (Bytes::from(rewritten), BodyOutcome::Injected)
            }
            Err(e) => {
                tracing::warn!(error = %e, "HTML sanitization failed, forwarding original body");
                (upstream.body, BodyOutcome::Fallback)
            }
        }
    } else {
        (upstream.body, BodyOutcome::Passthrough)
    };

    metrics::record_sanitize(outcome.as_str());

    SanitizedResponse {
        status: upstream.status,
        headers,
        body,
        outcome,
    }
}

/// Bytes that are not UTF-8 decode to U+FFFD; the document is still injected.
fn rewrite_html(body: &[u8]) -> Result<String, SanitizeError> {
    let source = String::from_utf8_lossy(body);
    if let Cow::Owned(_) = source {
        tracing::debug!("HTML body is not valid UTF-8, decoded lossily");
    }
    inject_fragment(&source)
}

/// Rewritten HTML is serialized as UTF-8, so the declared charset must say so.
fn with_utf8_charset(content_type: &str) -> String {
    let mut parts: Vec<&str> = content_type
        .split(';')
        .map(str::trim)
        .filter(|part| {
            !part
                .split_once('=')
                .is_some_and(|(name, _)| name.trim().eq_ignore_ascii_case("charset"))
        })
        .collect();
    parts.push("charset=utf-8");
    parts.join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upstream(content_type: &str, body: &'static [u8]) -> UpstreamResponse {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_str(content_type).unwrap());
        headers.append(header::SET_COOKIE, HeaderValue::from_static("sid=abc"));
        headers.append(header::SET_COOKIE, HeaderValue::from_static("uid=42"));
        headers.insert("x-upstream", HeaderValue::from_static("yes"));
        UpstreamResponse::new(StatusCode::OK, headers, Bytes::from_static(body))
    }

    #[test]
    fn html_is_injected_and_cookies_dropped() {
        let out = sanitize(upstream(
            "text/html; charset=utf-8",
            b"<html><head></head><body>hello</body></html>",
        ));

        assert_eq!(out.outcome, BodyOutcome::Injected);
        assert_eq!(out.status, StatusCode::OK);
        assert!(!out.headers.contains_key(header::SET_COOKIE));
        assert_eq!(out.headers.get("x-upstream").unwrap(), "yes");

        let body = std::str::from_utf8(&out.body).unwrap();
        assert_eq!(body.matches(INJECTION_FRAGMENT).count(), 1);
        assert!(body.contains("hello"));
    }

    #[test]
    fn json_passes_through_byte_for_byte() {
        let json: &'static [u8] = b"{\"a\": [1, 2, 3],   \"b\": \"<head></head>\"}";
        let out = sanitize(upstream("application/json", json));

        assert_eq!(out.outcome, BodyOutcome::Passthrough);
        assert_eq!(&out.body[..], json);
        assert!(!out.headers.contains_key(header::SET_COOKIE));
    }

    #[test]
    fn binary_passes_through() {
        let png: &'static [u8] = &[0x89, b'P', b'N', b'G', 0xff, 0x00, 0xfe];
        let out = sanitize(upstream("image/png", png));
        assert_eq!(out.outcome, BodyOutcome::Passthrough);
        assert_eq!(&out.body[..], png);
    }

    #[test]
    fn non_utf8_html_is_still_injected() {
        let latin1: &'static [u8] =
            b"<html><head></head><body>caf\xe9 <script>new RTCPeerConnection()</script></body></html>";
        let out = sanitize(upstream("text/html; charset=windows-1252", latin1));

        assert_eq!(out.outcome, BodyOutcome::Injected);
        let body = std::str::from_utf8(&out.body).unwrap();
        assert_eq!(body.matches(INJECTION_FRAGMENT).count(), 1);
        assert!(body.contains("caf\u{FFFD}"));
        assert_eq!(
            out.headers.get(header::CONTENT_TYPE).unwrap(),
            "text/html; charset=utf-8"
        );
        assert!(!out.headers.contains_key(header::SET_COOKIE));
    }

    #[test]
    fn charset_parameter_is_rewritten() {
        assert_eq!(with_utf8_charset("text/html"), "text/html; charset=utf-8");
        assert_eq!(
            with_utf8_charset("text/html;CHARSET=ISO-8859-1; foo=bar"),
            "text/html; foo=bar; charset=utf-8"
        );
    }

    #[test]
    fn status_is_carried_through() {
        let mut response = upstream("text/plain", b"missing");
        response.status = StatusCode::NOT_FOUND;
        assert_eq!(sanitize(response).status, StatusCode::NOT_FOUND);
    }
}
