use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::health;
use crate::store::DIRECTIVE_STREAM;

use super::AdminContext;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub active_proxy: Option<String>,
}

#[derive(Serialize)]
pub struct ProxyStatus {
    pub id: String,
    pub url: String,
    pub active: bool,
    pub healthy: bool,
}

#[derive(Serialize)]
pub struct RotateResponse {
    pub active: String,
}

#[derive(Deserialize)]
pub struct DirectiveRequest {
    #[serde(default)]
    pub block: bool,
    pub redirect_url: Option<String>,
}

#[derive(Serialize)]
pub struct DirectiveAccepted {
    pub id: String,
}

pub async fn get_status(State(ctx): State<Arc<AdminContext>>) -> Json<SystemStatus> {
    let active_proxy = ctx.registry.active_from_store().await.ok().flatten();
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        active_proxy,
    })
}

pub async fn get_proxies(State(ctx): State<Arc<AdminContext>>) -> Json<Vec<ProxyStatus>> {
    let current = ctx.registry.current();
    let mut statuses = Vec::new();
    for endpoint in ctx.registry.endpoints() {
        let healthy = health::probe(&ctx.health_client, &endpoint.url()).await;
        statuses.push(ProxyStatus {
            id: endpoint.id.clone(),
            url: endpoint.url(),
            active: endpoint == current,
            healthy,
        });
    }
    Json(statuses)
}

pub async fn rotate_now(
    State(ctx): State<Arc<AdminContext>>,
) -> Result<Json<RotateResponse>, StatusCode> {
    match ctx.registry.rotate().await {
        Ok(active) => Ok(Json(RotateResponse {
            active: active.url(),
        })),
        Err(e) => {
            tracing::error!(error = %e, "forced rotation failed");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

pub async fn post_directive(
    State(ctx): State<Arc<AdminContext>>,
    Json(request): Json<DirectiveRequest>,
) -> Result<Json<DirectiveAccepted>, StatusCode> {
    let mut fields = Vec::new();
    if request.block {
        fields.push(("block".to_string(), "true".to_string()));
    }
    if let Some(raw) = request.redirect_url {
        if Url::parse(&raw).is_err() {
            return Err(StatusCode::BAD_REQUEST);
        }
        fields.push(("redirect_url".to_string(), raw));
    }
    if fields.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    match ctx.store.xadd(DIRECTIVE_STREAM, &fields).await {
        Ok(id) => Ok(Json(DirectiveAccepted { id })),
        Err(e) => {
            tracing::error!(error = %e, "failed to append directive");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
