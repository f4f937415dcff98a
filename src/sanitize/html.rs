//! WebRTC countermeasure injection for HTML documents.
//!
//! The document is parsed with the HTML5 tree builder, which recovers from any
//! malformed input and always synthesizes a `<head>`. The fragment's nodes
//! are appended to the head element in the parsed tree, so markup that merely
//! looks like a head (in comments, attributes or script text) is never touched.

use std::sync::LazyLock;

use scraper::{Html, Selector};

use crate::sanitize::SanitizeError;

/// Script appended to the head of every proxied HTML document.
pub const INJECTION_FRAGMENT: &str = r#"
<script>
  if (window.RTCPeerConnection) {
    window.RTCPeerConnection = function() {
      throw new Error("WebRTC disabled by proxy for security.");
    };
  }
  if (window.webkitRTCPeerConnection) {
    window.webkitRTCPeerConnection = function() {
      throw new Error("WebRTC disabled by proxy for security.");
    };
  }
  document.cookie = "";
</script>
"#;

static HEAD_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("head").expect("Failed to parse head selector - this is a bug")
});

/// Parse `source`, append the fragment to its head and re-serialize.
pub fn inject_fragment(source: &str) -> Result<String, SanitizeError> {
    let mut document = Html::parse_document(source);
    if !document.errors.is_empty() {
        tracing::debug!(
            parse_errors = document.errors.len(),
            "Recovered from malformed markup"
        );
    }

    let head_id = document
        .select(&HEAD_SELECTOR)
        .next()
        .ok_or(SanitizeError::HeadNotFound)?
        .id();

    // The fragment's nodes hang off a synthetic <html> root. Scripts carry a
    // single text child, so two levels cover the whole fragment.
    let fragment = Html::parse_fragment(INJECTION_FRAGMENT);
    let mut head = document
        .tree
        .get_mut(head_id)
        .ok_or(SanitizeError::HeadNotFound)?;
    for node in fragment.root_element().children() {
        let mut copy = head.append(node.value().clone());
        for child in node.children() {
            copy.append(child.value().clone());
        }
    }

    Ok(document.html())
}
