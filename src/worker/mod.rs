//! Proxy worker.
//!
//! # Responsibilities
//! - Serve TLS on one internal endpoint
//! - Run the per-request pipeline: admit → confirm-active → buffer body →
//!   detection consult → forward → response transform
//! - Shed traffic with a 302 whenever this worker is not the active proxy
//!
//! # Design Decisions
//! - Requests are serialized under one admission mutex that also owns the
//!   rate counters; throughput is bounded but the pipeline needs no other
//!   synchronization
//! - ACTIVE vs SHEDDING is decided per request by comparing the store's
//!   `active_proxy` record against this worker's own URL; there is no
//!   persistent per-worker state
//! - On store failure the worker falls back to the subscriber-maintained
//!   cache, seeded with its own URL, so an isolated worker keeps serving

pub mod forward;
pub mod headers;
pub mod transform;

use std::net::SocketAddr;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::header::{HeaderValue, CONTENT_TYPE, HOST, LOCATION};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;
use url::Url;

use crate::directive::DirectiveConsumer;
use crate::error::StartupError;
use crate::observability::{logging, metrics};
use crate::rotation::Endpoint;
use crate::rules::header::HeaderRule;
use crate::security::detection::{Classification, DetectionClient};
use crate::security::rate_limit::RateLimiter;
use crate::store::{CoordinationStore, ACTIVE_PROXY_KEY, SWITCH_TOPIC};

/// HTML body served on a detection denial, read per request.
pub const FORBIDDEN_PAGE: &str = "403.html";

/// Everything one worker needs to process requests.
pub struct WorkerContext {
    pub proxy_id: String,
    pub public_url: String,
    pub backend: Url,
    pub store: Arc<dyn CoordinationStore>,
    pub client: reqwest::Client,
    pub header_rules: Arc<Vec<HeaderRule>>,
    pub detection: Option<DetectionClient>,
    pub directives: Option<Arc<DirectiveConsumer>>,
    /// Last switch announcement seen; fallback when the store is away.
    cached_active: RwLock<String>,
    /// Admission mutex: serializes the pipeline and owns the counters.
    admission: Mutex<RateLimiter>,
}

impl WorkerContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        endpoint: &Endpoint,
        backend: Url,
        store: Arc<dyn CoordinationStore>,
        header_rules: Arc<Vec<HeaderRule>>,
        detection: Option<DetectionClient>,
        directives: Option<Arc<DirectiveConsumer>>,
        rate_limit: u64,
        unsecure_cert: bool,
    ) -> Result<Arc<Self>, StartupError> {
        // Backend redirects belong to the client, not to this proxy.
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .danger_accept_invalid_certs(unsecure_cert)
            .build()
            .map_err(StartupError::Client)?;

        Ok(Arc::new(Self {
            proxy_id: endpoint.id.clone(),
            public_url: endpoint.url(),
            backend,
            store,
            client,
            header_rules,
            detection,
            directives,
            cached_active: RwLock::new(endpoint.url()),
            admission: Mutex::new(RateLimiter::new(rate_limit)),
        }))
    }

    fn cached_active(&self) -> String {
        self.cached_active
            .read()
            .expect("active cache poisoned")
            .clone()
    }

    fn update_cached_active(&self, url: String) {
        *self.cached_active.write().expect("active cache poisoned") = url;
    }
}

/// Seed the active-proxy cache from the store, then keep it fresh from the
/// switch topic. Runs for the process lifetime.
pub fn spawn_active_cache(ctx: Arc<WorkerContext>) {
    tokio::spawn(async move {
        match ctx.store.get(ACTIVE_PROXY_KEY).await {
            Ok(Some(url)) => ctx.update_cached_active(url),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(proxy_id = %ctx.proxy_id, error = %e, "could not seed active-proxy cache")
            }
        }

        loop {
            match ctx.store.subscribe(SWITCH_TOPIC).await {
                Ok(mut updates) => {
                    while let Some(url) = updates.recv().await {
                        tracing::info!(proxy_id = %ctx.proxy_id, url = %url, "received proxy switch");
                        ctx.update_cached_active(url);
                    }
                    tracing::warn!(proxy_id = %ctx.proxy_id, "switch subscription closed, resubscribing");
                }
                Err(e) => {
                    tracing::warn!(proxy_id = %ctx.proxy_id, error = %e, "switch subscription failed")
                }
            }
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
    });
}

/// Build the worker router: a health probe plus the catch-all pipeline.
pub fn router(ctx: Arc<WorkerContext>) -> Router {
    Router::new()
        .route("/health", get(health))
        .fallback(pipeline)
        .layer(TraceLayer::new_for_http())
        .with_state(ctx)
}

/// Serve one worker over TLS. Blocks for the process lifetime.
pub async fn serve(
    ctx: Arc<WorkerContext>,
    port: u16,
    tls: RustlsConfig,
) -> Result<(), std::io::Error> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(proxy_id = %ctx.proxy_id, address = %addr, "starting proxy worker");
    axum_server::bind_rustls(addr, tls)
        .serve(router(ctx).into_make_service_with_connect_info::<SocketAddr>())
        .await
}

async fn health() -> &'static str {
    "proxy is healthy"
}

async fn pipeline(
    State(ctx): State<Arc<WorkerContext>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: Request,
) -> Response {
    let start = Instant::now();
    let method = request.method().as_str().to_string();
    let response = handle(&ctx, addr, request).await;
    metrics::record_request(&ctx.proxy_id, response.status().as_u16(), &method, start);
    response
}

async fn handle(ctx: &WorkerContext, addr: SocketAddr, request: Request) -> Response {
    logging::log_request(request.method(), request.uri(), addr);

    let mut limiter = ctx.admission.lock().await;
    if !limiter.admit(&addr.ip().to_string()) {
        return (StatusCode::TOO_MANY_REQUESTS, "Too Many Requests").into_response();
    }

    let request_uri = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());
    tracing::debug!(proxy_id = %ctx.proxy_id, uri = %request_uri, "pipeline admitted request");

    // Confirm this worker is still the active proxy; shed otherwise.
    let active = match ctx.store.get(ACTIVE_PROXY_KEY).await {
        Ok(Some(url)) => {
            ctx.update_cached_active(url.clone());
            url
        }
        Ok(None) => ctx.cached_active(),
        Err(e) => {
            tracing::warn!(proxy_id = %ctx.proxy_id, error = %e, "active-proxy read failed, using cached value");
            ctx.cached_active()
        }
    };

    let host = request
        .headers()
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if format!("https://{host}") != active {
        return shed_redirect(&active, &request_uri);
    }

    // Buffer the body so both the detector and the upstream see it whole.
    let (parts, body) = request.into_parts();
    let body = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(proxy_id = %ctx.proxy_id, uri = %request_uri, error = %e, "failed to read request body");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to read request body")
                .into_response();
        }
    };

    if let Some(detector) = &ctx.detection {
        match detector.classify(&request_uri, &body).await {
            Ok(Classification::Benign) => {}
            Ok(Classification::Malicious) => return malicious_response().await,
            Err(e) => {
                tracing::error!(proxy_id = %ctx.proxy_id, uri = %request_uri, error = %e, "detection service unreachable");
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to connect to detection service",
                )
                    .into_response();
            }
        }
    }

    forward::forward(ctx, &parts, body).await
}

/// 302 toward the active proxy, preserving the original request URI.
fn shed_redirect(active: &str, request_uri: &str) -> Response {
    let location = format!("{active}{request_uri}");
    match HeaderValue::from_str(&location) {
        Ok(value) => {
            let mut response = Response::new(Body::empty());
            *response.status_mut() = StatusCode::FOUND;
            response.headers_mut().insert(LOCATION, value);
            response
        }
        Err(e) => {
            tracing::error!(location = %location, error = %e, "unrepresentable shed location");
            (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
        }
    }
}

/// 403 with the operator-provided HTML page.
async fn malicious_response() -> Response {
    match tokio::fs::read(FORBIDDEN_PAGE).await {
        Ok(html) => {
            let mut response = Response::new(Body::from(html));
            *response.status_mut() = StatusCode::FORBIDDEN;
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static("text/html"));
            response
        }
        Err(e) => {
            tracing::error!(page = FORBIDDEN_PAGE, error = %e, "failed to load 403 page");
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to load 403 page").into_response()
        }
    }
}
