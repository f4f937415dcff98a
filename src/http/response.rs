//! Response handling and transformation.
//!
//! # Responsibilities
//! - Turn a sanitized upstream response into the caller's response
//! - Drop framing and hop-by-hop headers; hyper recomputes them for the
//!   (possibly rewritten) body
//! - Map dispatcher failures to a fixed, generic error
//!
//! # Design Decisions
//! - The error body never carries upstream diagnostics

use axum::body::Body;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::sanitize::SanitizedResponse;
use crate::security::headers::strip_hop_by_hop;

/// Status sent when the upstream fetch fails.
pub const PROXY_ERROR_STATUS: StatusCode = StatusCode::INTERNAL_SERVER_ERROR;

/// Body sent when the upstream fetch fails.
pub const PROXY_ERROR_BODY: &str = "Proxy error";

/// Generic failure response for the caller.
pub fn proxy_error() -> Response {
    (PROXY_ERROR_STATUS, PROXY_ERROR_BODY).into_response()
}

impl IntoResponse for SanitizedResponse {
    fn into_response(self) -> Response {
        let mut headers = self.headers;
        strip_hop_by_hop(&mut headers);
        headers.remove(header::CONTENT_LENGTH);

        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = headers;
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sanitize::BodyOutcome;
    use axum::body::Bytes;
    use axum::http::{HeaderMap, HeaderValue};

    #[tokio::test]
    async fn framing_headers_recomputed() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from_static("3"));
        headers.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));

        let response = SanitizedResponse {
            status: StatusCode::CREATED,
            headers,
            body: Bytes::from_static(b"longer body"),
            outcome: BodyOutcome::Passthrough,
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::CREATED);
        assert!(!response.headers().contains_key(header::CONTENT_LENGTH));
        assert!(!response.headers().contains_key(header::TRANSFER_ENCODING));
        assert_eq!(response.headers().get(header::CONTENT_TYPE).unwrap(), "text/plain");

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"longer body");
    }

    #[tokio::test]
    async fn proxy_error_is_generic() {
        let response = proxy_error();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"Proxy error");
    }
}
