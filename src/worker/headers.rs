//! Header plumbing for the forwarding path.

use axum::http::header::{HeaderName, HeaderValue, CONTENT_LENGTH};
use axum::http::HeaderMap;

/// Identifies which worker forwarded a request to the backend.
pub const X_PROXY_ID: HeaderName = HeaderName::from_static("x-proxy-id");

/// Hop-by-hop headers that must not cross the proxy boundary.
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
];

pub fn is_hop_by_hop(header_name: &str) -> bool {
    HOP_BY_HOP_HEADERS.contains(&header_name)
}

/// Build the outbound header map: everything end-to-end from the inbound
/// request (Host included, so the backend sees the original authority),
/// plus the worker's identity. Content-Length is recomputed from the
/// buffered body by the client.
pub fn forward_headers(inbound: &HeaderMap, proxy_id: &str) -> HeaderMap {
    let mut outbound = HeaderMap::new();
    for (name, value) in inbound {
        if is_hop_by_hop(name.as_str()) || name == CONTENT_LENGTH {
            continue;
        }
        outbound.append(name.clone(), value.clone());
    }
    if let Ok(id) = HeaderValue::from_str(proxy_id) {
        outbound.insert(X_PROXY_ID, id);
    }
    outbound
}

/// Drop hop-by-hop headers from an upstream response before it is
/// re-framed for the client.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let doomed: Vec<HeaderName> = headers
        .keys()
        .filter(|name| is_hop_by_hop(name.as_str()))
        .cloned()
        .collect();
    for name in doomed {
        headers.remove(name);
    }
}
