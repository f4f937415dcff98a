//! Response header filtering.

use axum::http::{header, HeaderMap};

/// Copy of `upstream` without any `Set-Cookie` header.
///
/// Header names are case-insensitive by construction, so every spelling and
/// every repeated value of `Set-Cookie` is dropped.
pub fn filter_headers(upstream: &HeaderMap) -> HeaderMap {
    let mut filtered = HeaderMap::with_capacity(upstream.len());
    for (name, value) in upstream {
        if name == header::SET_COOKIE {
            continue;
        }
        filtered.append(name.clone(), value.clone());
    }
    filtered
}

/// Number of `Set-Cookie` values `filter_headers` would drop.
pub fn set_cookie_count(upstream: &HeaderMap) -> usize {
    upstream.get_all(header::SET_COOKIE).iter().count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderName, HeaderValue};

    #[test]
    fn drops_every_set_cookie() {
        let mut upstream = HeaderMap::new();
        upstream.append(header::SET_COOKIE, HeaderValue::from_static("sid=abc"));
        upstream.append(
            HeaderName::from_bytes(b"SET-COOKIE").unwrap(),
            HeaderValue::from_static("track=1"),
        );
        upstream.append(
            HeaderName::from_bytes(b"Set-Cookie").unwrap(),
            HeaderValue::from_static("ab=2; HttpOnly"),
        );
        upstream.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/html"));

        assert_eq!(set_cookie_count(&upstream), 3);

        let filtered = filter_headers(&upstream);
        assert!(!filtered.contains_key(header::SET_COOKIE));
        assert_eq!(filtered.len(), 1);
    }

    #[test]
    fn keeps_multi_valued_headers() {
        let mut upstream = HeaderMap::new();
        upstream.append(header::VARY, HeaderValue::from_static("accept"));
        upstream.append(header::VARY, HeaderValue::from_static("origin"));
        upstream.insert("set-cookie2", HeaderValue::from_static("legacy"));

        let filtered = filter_headers(&upstream);
        assert_eq!(filtered.get_all(header::VARY).iter().count(), 2);
        assert!(filtered.contains_key("set-cookie2"));
    }

    #[test]
    fn input_is_untouched() {
        let mut upstream = HeaderMap::new();
        upstream.insert(header::SET_COOKIE, HeaderValue::from_static("sid=abc"));
        let _ = filter_headers(&upstream);
        assert_eq!(set_cookie_count(&upstream), 1);
    }
}
