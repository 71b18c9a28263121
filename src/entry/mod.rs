//! Public entry point.
//!
//! # Responsibilities
//! - Terminate TLS on the fixed public address
//! - Apply ACLs and the suspicion gate before anything else
//! - 307-redirect every request to the current active proxy
//! - Expose `/metrics` and route `/api/*` to the admin surface
//!
//! # Design Decisions
//! - 307 (not 302) so POST bodies survive the redirect
//! - The entry never proxies; exposing worker hosts to the client is the
//!   documented observable behavior of this design
//! - Store failure on the suspicion path maps to 500 here; only the
//!   workers carry a fallback active URL

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::header::{HeaderValue, CONTENT_TYPE, LOCATION};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::observability::logging;
use crate::rotation::Registry;
use crate::rules::acl::{AclConfig, Verdict};
use crate::rules::RequestMeta;
use crate::security::suspicion::{SuspicionTracker, ATTACK_PENALTY, BASELINE_INCREMENT};
use crate::store::StoreError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub struct EntryContext {
    pub registry: Arc<Registry>,
    pub acl: Option<AclConfig>,
    pub suspicion: Option<SuspicionTracker>,
    pub metrics: PrometheusHandle,
    pub api_enabled: bool,
}

/// Build the entry router. The admin router is nested under `/api` when
/// the surface is enabled; otherwise the fallback answers for that prefix.
pub fn router(ctx: Arc<EntryContext>, admin: Option<Router>) -> Router {
    let mut router = Router::new()
        .route("/metrics", get(metrics_endpoint))
        .fallback(redirect_to_active)
        .with_state(ctx);
    if let Some(admin) = admin {
        router = router.nest("/api", admin);
    }
    router
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(TraceLayer::new_for_http())
}

/// Serve the entry point over TLS until the handle is shut down.
pub async fn serve(
    router: Router,
    port: u16,
    tls: RustlsConfig,
    handle: Handle,
) -> Result<(), std::io::Error> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(address = %addr, "starting public entry point");
    axum_server::bind_rustls(addr, tls)
        .handle(handle)
        .serve(router.into_make_service_with_connect_info::<SocketAddr>())
        .await
}

async fn metrics_endpoint(State(ctx): State<Arc<EntryContext>>) -> Response {
    let mut response = Response::new(Body::from(ctx.metrics.render()));
    response.headers_mut().insert(
        CONTENT_TYPE,
        HeaderValue::from_static("text/plain; version=0.0.4"),
    );
    response
}

async fn redirect_to_active(
    State(ctx): State<Arc<EntryContext>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
) -> Response {
    let meta = RequestMeta {
        method: request.method(),
        uri: request.uri(),
        headers: request.headers(),
        remote_ip: addr.ip(),
    };

    if let Some(acl) = &ctx.acl {
        match acl.evaluate(&meta) {
            Verdict::Deny(status, body) => return deny_response(status, body),
            Verdict::Allow | Verdict::Passthrough => {}
        }
    }

    if request.uri().path().starts_with("/api/") && !ctx.api_enabled {
        return (StatusCode::NOT_FOUND, "API not enabled").into_response();
    }

    if let Some(suspicion) = &ctx.suspicion {
        let ip = addr.ip().to_string();
        if SuspicionTracker::detect_attack(&meta) {
            if let Err(e) = suspicion.update_rating(&ip, ATTACK_PENALTY).await {
                return store_failure(&e);
            }
        }
        match suspicion.is_banned(&ip).await {
            Ok(true) => {
                tracing::warn!(ip = %ip, "refusing source over suspicion threshold");
                return (StatusCode::FORBIDDEN, "Forbidden").into_response();
            }
            Ok(false) => {}
            Err(e) => return store_failure(&e),
        }
        if let Err(e) = suspicion.update_rating(&ip, BASELINE_INCREMENT).await {
            return store_failure(&e);
        }
    }

    logging::log_request(request.method(), request.uri(), addr);

    let active = ctx.registry.current();
    let request_uri = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let location = format!("{}{}", active.url(), request_uri);
    match HeaderValue::from_str(&location) {
        Ok(value) => {
            let mut response = Response::new(Body::empty());
            *response.status_mut() = StatusCode::TEMPORARY_REDIRECT;
            response.headers_mut().insert(LOCATION, value);
            response
        }
        Err(e) => {
            tracing::error!(location = %location, error = %e, "unrepresentable redirect location");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
        }
    }
}

fn deny_response(status: StatusCode, body: Option<String>) -> Response {
    let body = body.unwrap_or_else(|| {
        status
            .canonical_reason()
            .unwrap_or("Request denied")
            .to_string()
    });
    (status, body).into_response()
}

fn store_failure(e: &StoreError) -> Response {
    tracing::error!(error = %e, "coordination store unavailable at entry point");
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
}
