//! WebSocket tunnel engine.
//!
//! # Responsibilities
//! - Claim WebSocket upgrades under the tunnel prefix that name a target
//! - Dial the ws:// or wss:// target before answering the caller
//! - Complete the handshake with the caller (101 Switching Protocols)
//! - Bidirectional frame forwarding
//!
//! # Data Flow
//! ```text
//! Client ←──── WebSocket frames ────→ Proxy ←──── WebSocket frames ────→ Target
//! ```
//!
//! # Design Decisions
//! - Frame-level forwarding (no message buffering)
//! - Close frames propagated in both directions; either side finishing ends both
//! - Ping/pong handled by tungstenite on each leg
//! - The caller's Cookie header is never sent to the target

use axum::body::Body;
use axum::extract::Request;
use axum::http::{header, HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use futures_util::future::BoxFuture;
use futures_util::{SinkExt, StreamExt};
use hyper_util::rt::TokioIo;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tokio_tungstenite::tungstenite::protocol::Role;
use tokio_tungstenite::WebSocketStream;
use url::Url;

use crate::config::TunnelConfig;
use crate::http::request::query_param;
use crate::http::upgrade::TunnelEngine;

/// Client headers carried over to the target handshake.
static FORWARDED_HANDSHAKE_HEADERS: [header::HeaderName; 3] = [
    header::SEC_WEBSOCKET_PROTOCOL,
    header::ORIGIN,
    header::USER_AGENT,
];

/// Tunnel failures, reported to the caller before the handshake completes.
#[derive(Debug, Error)]
pub enum TunnelError {
    #[error("missing Sec-WebSocket-Key")]
    MissingKey,

    #[error("invalid tunnel target: {0}")]
    InvalidTarget(#[source] tokio_tungstenite::tungstenite::Error),

    #[error("failed to reach tunnel target: {0}")]
    Connect(#[source] tokio_tungstenite::tungstenite::Error),
}

impl IntoResponse for TunnelError {
    fn into_response(self) -> Response {
        let status = match self {
            TunnelError::MissingKey | TunnelError::InvalidTarget(_) => StatusCode::BAD_REQUEST,
            TunnelError::Connect(_) => StatusCode::BAD_GATEWAY,
        };
        (status, self.to_string()).into_response()
    }
}

/// Relays WebSocket connections mounted under a path prefix.
#[derive(Debug, Clone)]
pub struct WebSocketTunnel {
    path_prefix: String,
    target_param: String,
}

impl WebSocketTunnel {
    pub fn new(config: &TunnelConfig) -> Self {
        Self {
            path_prefix: config.path_prefix.clone(),
            target_param: config.target_param.clone(),
        }
    }

    /// The ws:// or wss:// target named by the request, if any.
    pub fn target(&self, uri: &Uri) -> Option<Url> {
        let raw = query_param(uri, &self.target_param)?;
        let url = Url::parse(&raw).ok()?;
        matches!(url.scheme(), "ws" | "wss").then_some(url)
    }
}

impl TunnelEngine for WebSocketTunnel {
    fn should_route(&self, request: &Request) -> bool {
        let wants_websocket = request
            .headers()
            .get(header::UPGRADE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.eq_ignore_ascii_case("websocket"));

        wants_websocket
            && request.uri().path().starts_with(&self.path_prefix)
            && self.target(request.uri()).is_some()
    }

    fn route_upgrade(&self, request: Request) -> BoxFuture<'static, Response> {
        let target = self.target(request.uri());
        Box::pin(async move {
            let Some(target) = target else {
                return (StatusCode::BAD_REQUEST, "Missing tunnel target").into_response();
            };
            match complete_upgrade(target, request).await {
                Ok(response) => response,
                Err(e) => {
                    tracing::warn!(error = %e, "Tunnel upgrade failed");
                    e.into_response()
                }
            }
        })
    }
}

async fn complete_upgrade(target: Url, mut request: Request) -> Result<Response, TunnelError> {
    let accept_key = request
        .headers()
        .get(header::SEC_WEBSOCKET_KEY)
        .filter(|key| !key.is_empty())
        .map(|key| derive_accept_key(key.as_bytes()))
        .ok_or(TunnelError::MissingKey)?;

    let mut upstream_request = target
        .as_str()
        .into_client_request()
        .map_err(TunnelError::InvalidTarget)?;
    copy_handshake_headers(request.headers(), upstream_request.headers_mut());

    let (upstream, upstream_response) = tokio_tungstenite::connect_async(upstream_request)
        .await
        .map_err(TunnelError::Connect)?;

    tracing::info!(url = %target, "Tunnel connected to target");

    let protocol = upstream_response
        .headers()
        .get(header::SEC_WEBSOCKET_PROTOCOL)
        .cloned();

    let on_upgrade = hyper::upgrade::on(&mut request);
    tokio::spawn(async move {
        match on_upgrade.await {
            Ok(upgraded) => {
                let client =
                    WebSocketStream::from_raw_socket(TokioIo::new(upgraded), Role::Server, None)
                        .await;
                relay(client, upstream).await;
                tracing::debug!(url = %target, "Tunnel closed");
            }
            Err(e) => tracing::warn!(error = %e, "Client upgrade failed"),
        }
    });

    let mut response = Response::builder()
        .status(StatusCode::SWITCHING_PROTOCOLS)
        .header(header::UPGRADE, "websocket")
        .header(header::CONNECTION, "upgrade")
        .header(header::SEC_WEBSOCKET_ACCEPT, accept_key);
    if let Some(protocol) = protocol {
        response = response.header(header::SEC_WEBSOCKET_PROTOCOL, protocol);
    }
    Ok(response
        .body(Body::empty())
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response()))
}

fn copy_handshake_headers(from: &HeaderMap, to: &mut HeaderMap) {
    for name in FORWARDED_HANDSHAKE_HEADERS.iter() {
        for value in from.get_all(name) {
            to.append(name.clone(), value.clone());
        }
    }
}

/// Forward frames both ways until either side closes.
async fn relay<C, U>(client: WebSocketStream<C>, upstream: WebSocketStream<U>)
where
    C: AsyncRead + AsyncWrite + Unpin + Send,
    U: AsyncRead + AsyncWrite + Unpin + Send,
{
    let (mut client_tx, mut client_rx) = client.split();
    let (mut upstream_tx, mut upstream_rx) = upstream.split();

    let client_to_upstream = async move {
        while let Some(Ok(msg)) = client_rx.next().await {
            let is_close = msg.is_close();
            if let Err(e) = upstream_tx.send(msg).await {
                tracing::debug!(error = %e, "Error forwarding to target");
                break;
            }
            if is_close {
                break;
            }
        }
        let _ = upstream_tx.close().await;
    };

    let upstream_to_client = async move {
        while let Some(Ok(msg)) = upstream_rx.next().await {
            let is_close = msg.is_close();
            if let Err(e) = client_tx.send(msg).await {
                tracing::debug!(error = %e, "Error forwarding to client");
                break;
            }
            if is_close {
                break;
            }
        }
        let _ = client_tx.close().await;
    };

    tokio::select! {
        _ = client_to_upstream => {}
        _ = upstream_to_client => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http;

    fn tunnel() -> WebSocketTunnel {
        WebSocketTunnel::new(&TunnelConfig::default())
    }

    fn ws_request(uri: &str) -> Request {
        http::Request::builder()
            .uri(uri)
            .header(header::CONNECTION, "Upgrade")
            .header(header::UPGRADE, "websocket")
            .header(header::SEC_WEBSOCKET_KEY, "dGhlIHNhbXBsZSBub25jZQ==")
            .body(Body::empty())
            .unwrap()
    }

    #[test]
    fn routes_websocket_under_prefix_with_target() {
        let engine = tunnel();
        assert!(engine.should_route(&ws_request("/bare/?url=ws%3A%2F%2F127.0.0.1%3A9000%2Fchat")));
        assert!(engine.should_route(&ws_request("/bare/v3/?url=wss://example.com/socket")));
    }

    #[test]
    fn declines_outside_prefix_or_without_target() {
        let engine = tunnel();
        assert!(!engine.should_route(&ws_request("/other/?url=ws://127.0.0.1:9000/")));
        assert!(!engine.should_route(&ws_request("/bare/")));
        assert!(!engine.should_route(&ws_request("/bare/?url=http://example.com/")));
    }

    #[test]
    fn declines_non_websocket_upgrades() {
        let request = http::Request::builder()
            .uri("/bare/?url=ws://127.0.0.1:9000/")
            .header(header::CONNECTION, "Upgrade")
            .header(header::UPGRADE, "h2c")
            .body(Body::empty())
            .unwrap();
        assert!(!tunnel().should_route(&request));
    }

    #[test]
    fn handshake_headers_exclude_cookie() {
        let mut from = HeaderMap::new();
        from.insert(header::ORIGIN, "https://app.test".parse().unwrap());
        from.insert(header::COOKIE, "sid=abc".parse().unwrap());
        from.insert(header::SEC_WEBSOCKET_PROTOCOL, "chat".parse().unwrap());

        let mut to = HeaderMap::new();
        copy_handshake_headers(&from, &mut to);

        assert_eq!(to.get(header::ORIGIN).unwrap(), "https://app.test");
        assert_eq!(to.get(header::SEC_WEBSOCKET_PROTOCOL).unwrap(), "chat");
        assert!(!to.contains_key(header::COOKIE));
    }

    #[tokio::test]
    async fn missing_key_is_rejected() {
        let request = http::Request::builder()
            .uri("/bare/?url=ws://127.0.0.1:9/")
            .header(header::CONNECTION, "Upgrade")
            .header(header::UPGRADE, "websocket")
            .body(Body::empty())
            .unwrap();
        let response = tunnel().route_upgrade(request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
