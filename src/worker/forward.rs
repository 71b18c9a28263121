//! Director: builds and dispatches the upstream request.
//!
//! Before dispatch the director consults the directive stream once. This
//! deliberately sits in the request path so operators get one-request
//! latency on injected blocks and redirects.

use axum::body::Bytes;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use url::Url;

use crate::worker::headers::forward_headers;
use crate::worker::transform;
use crate::worker::WorkerContext;

/// Single-host reverse-proxy target: the backend's scheme and authority,
/// the inbound request's path and query.
fn upstream_target(backend: &Url, uri: &axum::http::Uri) -> Url {
    let mut target = backend.clone();
    let base = backend.path().trim_end_matches('/');
    if base.is_empty() {
        target.set_path(uri.path());
    } else {
        target.set_path(&format!("{}{}", base, uri.path()));
    }
    target.set_query(uri.query());
    target
}

/// Apply a redirect directive: scheme, host, and path come from the
/// directive, the original query survives.
fn redirect_target(directive_url: &Url, uri: &axum::http::Uri) -> Url {
    let mut target = directive_url.clone();
    target.set_query(uri.query());
    target
}

pub async fn forward(ctx: &WorkerContext, parts: &Parts, body: Bytes) -> Response {
    let mut target = upstream_target(&ctx.backend, &parts.uri);

    if let Some(consumer) = &ctx.directives {
        if let Some(directive) = consumer.poll_one().await {
            if directive.block {
                tracing::info!(proxy_id = %ctx.proxy_id, uri = %parts.uri, "dropping upstream dial per block directive");
                return (StatusCode::BAD_GATEWAY, "Bad Gateway").into_response();
            }
            if let Some(redirect) = &directive.redirect_url {
                target = redirect_target(redirect, &parts.uri);
                tracing::info!(proxy_id = %ctx.proxy_id, target = %target, "redirected upstream per stream directive");
            }
        }
    }

    let outcome = ctx
        .client
        .request(parts.method.clone(), target.as_str())
        .headers(forward_headers(&parts.headers, &ctx.proxy_id))
        .body(body)
        .send()
        .await;

    match outcome {
        Ok(upstream) => transform::respond(&ctx.header_rules, &parts.headers, upstream).await,
        Err(e) => {
            tracing::error!(proxy_id = %ctx.proxy_id, url = %target, error = %e, "upstream request failed");
            (StatusCode::BAD_GATEWAY, "Bad Gateway").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Uri;

    #[test]
    fn target_joins_backend_with_request_path_and_query() {
        let backend = Url::parse("http://127.0.0.1:5000").unwrap();
        let uri: Uri = "/search?q=rust".parse().unwrap();
        let target = upstream_target(&backend, &uri);
        assert_eq!(target.as_str(), "http://127.0.0.1:5000/search?q=rust");
    }

    #[test]
    fn target_respects_backend_path_prefix() {
        let backend = Url::parse("http://127.0.0.1:5000/app/").unwrap();
        let uri: Uri = "/login".parse().unwrap();
        let target = upstream_target(&backend, &uri);
        assert_eq!(target.as_str(), "http://127.0.0.1:5000/app/login");
    }

    #[test]
    fn redirect_directive_keeps_original_query() {
        let directive = Url::parse("https://mirror.example/hold").unwrap();
        let uri: Uri = "/login?next=%2Fhome".parse().unwrap();
        let target = redirect_target(&directive, &uri);
        assert_eq!(target.as_str(), "https://mirror.example/hold?next=%2Fhome");
    }
}
