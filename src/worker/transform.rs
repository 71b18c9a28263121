//! Upstream response transformation.
//!
//! Header rules run first, then the body is optionally re-encoded with
//! gzip when the client asked for it. A response the backend already
//! compressed is passed through untouched; re-encoding it would corrupt
//! the stream.

use std::io::Write;

use axum::body::{Body, Bytes};
use axum::http::header::{HeaderValue, ACCEPT_ENCODING, CONTENT_ENCODING, CONTENT_LENGTH};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::rules::header::{self as header_rules, HeaderRule};
use crate::worker::headers;

/// True when the original request advertised gzip support.
pub fn accepts_gzip(request_headers: &HeaderMap) -> bool {
    request_headers
        .get(ACCEPT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_ascii_lowercase().contains("gzip"))
        .unwrap_or(false)
}

fn is_gzip_encoded(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_ascii_lowercase().contains("gzip"))
        .unwrap_or(false)
}

pub fn gzip_encode(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

/// Turn the upstream response into the client-facing one.
pub async fn respond(
    rules: &[HeaderRule],
    request_headers: &HeaderMap,
    upstream: reqwest::Response,
) -> Response {
    let status = upstream.status();
    let url = upstream.url().to_string();
    let mut response_headers = upstream.headers().clone();

    let body = match upstream.bytes().await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(url = %url, error = %e, "failed to read upstream response body");
            return (StatusCode::BAD_GATEWAY, "Bad Gateway").into_response();
        }
    };

    headers::strip_hop_by_hop(&mut response_headers);
    header_rules::apply(rules, &mut response_headers);

    let body = if accepts_gzip(request_headers) && !is_gzip_encoded(&response_headers) {
        match gzip_encode(&body) {
            Ok(encoded) => {
                response_headers.insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
                response_headers.remove(CONTENT_LENGTH);
                Bytes::from(encoded)
            }
            Err(e) => {
                tracing::error!(url = %url, error = %e, "gzip re-encoding failed");
                return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode response")
                    .into_response();
            }
        }
    } else {
        body
    };

    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    *response.headers_mut() = response_headers;
    response
}
