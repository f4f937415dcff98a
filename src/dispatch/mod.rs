//! Request dispatcher.
//!
//! # Data Flow
//! ```text
//! Proxy request (target URL + caller headers)
//!     → parse_target (http/https only)
//!     → upstream_headers (Cookie forced empty, hop-by-hop dropped)
//!     → GET target (bounded redirects, connect + total timeout)
//!     → body buffered up to max_body_bytes
//!     → UpstreamResponse
//! ```
//!
//! # Design Decisions
//! - Always GET, never retried
//! - Dropping the returned future abandons the fetch
//! - The client pools connections and is shared through the server context

pub mod error;

use std::time::Duration;

use axum::body::Bytes;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use reqwest::redirect::Policy;
use url::Url;

use crate::config::{ForwardConfig, TimeoutConfig};
use crate::http::request::upstream_headers;

pub use error::DispatchError;

/// Result of fetching the target URL.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Declared `Content-Type`, if any.
    pub content_type: Option<String>,
}

impl UpstreamResponse {
    /// Build a response, deriving the content type from `headers`.
    pub fn new(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        let content_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        Self {
            status,
            headers,
            body,
            content_type,
        }
    }

    /// Whether the declared content type names HTML.
    pub fn is_html(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|ct| ct.to_ascii_lowercase().contains("text/html"))
    }
}

/// Performs upstream fetches on behalf of proxy requests.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    client: reqwest::Client,
    max_body_bytes: usize,
    user_agent: Option<HeaderValue>,
}

impl Dispatcher {
    /// Build a dispatcher and its pooled HTTP client.
    pub fn new(forward: &ForwardConfig, timeouts: &TimeoutConfig) -> Result<Self, DispatchError> {
        let redirect = if forward.max_redirects == 0 {
            Policy::none()
        } else {
            Policy::limited(forward.max_redirects)
        };

        let client = reqwest::Client::builder()
            .redirect(redirect)
            .connect_timeout(Duration::from_secs(timeouts.connect_secs))
            .timeout(Duration::from_secs(timeouts.upstream_secs))
            .no_proxy()
            .build()
            .map_err(DispatchError::Client)?;

        let user_agent = match forward.user_agent.as_deref() {
            Some(ua) => match HeaderValue::from_str(ua) {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!(user_agent = %ua, "Ignoring invalid user agent override");
                    None
                }
            },
            None => None,
        };

        Ok(Self {
            client,
            max_body_bytes: forward.max_body_bytes,
            user_agent,
        })
    }

    /// Parse a caller-supplied target, accepting only http and https.
    pub fn parse_target(target: &str) -> Result<Url, DispatchError> {
        let url = Url::parse(target).map_err(|e| DispatchError::InvalidTarget {
            target: target.to_string(),
            reason: e.to_string(),
        })?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(DispatchError::UnsupportedScheme(other.to_string())),
        }
    }

    /// Fetch `target` with the caller's headers and buffer the body.
    pub async fn dispatch(
        &self,
        target: &str,
        inbound: &HeaderMap,
    ) -> Result<UpstreamResponse, DispatchError> {
        let url = Self::parse_target(target)?;

        let mut headers = upstream_headers(inbound);
        if let Some(ua) = &self.user_agent {
            headers.insert(header::USER_AGENT, ua.clone());
        }

        tracing::debug!(url = %url, "Fetching upstream");

        let mut response = self
            .client
            .get(url)
            .headers(headers)
            .send()
            .await
            .map_err(DispatchError::from_send)?;

        let status = response.status();
        let headers = response.headers().clone();

        if response
            .content_length()
            .is_some_and(|len| len > self.max_body_bytes as u64)
        {
            return Err(DispatchError::BodyTooLarge {
                limit: self.max_body_bytes,
            });
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(DispatchError::from_body)? {
            if body.len() + chunk.len() > self.max_body_bytes {
                return Err(DispatchError::BodyTooLarge {
                    limit: self.max_body_bytes,
                });
            }
            body.extend_from_slice(&chunk);
        }

        tracing::debug!(
            status = %status,
            body_bytes = body.len(),
            "Upstream responded"
        );

        Ok(UpstreamResponse::new(status, headers, Bytes::from(body)))
    }
}
