//! Request handling and transformation.
//!
//! # Responsibilities
//! - Extract the target URL from the query string
//! - Prepare the caller's headers for forwarding upstream
//!
//! # Design Decisions
//! - A missing or empty target is not an error; callers fall through
//! - `Cookie` is always forwarded as an empty value, whatever the caller sent
//! - Connection-scoped headers never cross the proxy

use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Uri};

use crate::security::headers::{connection_listed, is_hop_by_hop};

/// Request headers never copied upstream. Host must name the upstream;
/// length and encoding are renegotiated by the client, which decodes
/// compressed bodies itself. Cookie is re-added empty.
static NOT_FORWARDED: [HeaderName; 4] = [
    header::HOST,
    header::CONTENT_LENGTH,
    header::ACCEPT_ENCODING,
    header::COOKIE,
];

/// First non-empty value of query parameter `name`, percent-decoded.
pub fn query_param(uri: &Uri, name: &str) -> Option<String> {
    let query = uri.query()?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}

/// Target URL of a proxy request, if the request is one.
pub fn target_url(uri: &Uri, param: &str) -> Option<String> {
    query_param(uri, param)
}

/// Build the header set sent upstream from the caller's headers.
pub fn upstream_headers(inbound: &HeaderMap) -> HeaderMap {
    let nominated = connection_listed(inbound);
    let mut headers = HeaderMap::with_capacity(inbound.len());

    for (name, value) in inbound {
        if is_hop_by_hop(name) || nominated.contains(name) || NOT_FORWARDED.contains(name) {
            continue;
        }
        headers.append(name.clone(), value.clone());
    }

    headers.insert(header::COOKIE, HeaderValue::from_static(""));
    headers
}
