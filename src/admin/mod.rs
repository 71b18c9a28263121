//! Administrative API, mounted under `/api` behind a startup-generated
//! bearer key.

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::{middleware, Router};
use rand::Rng;

use crate::rotation::Registry;
use crate::store::CoordinationStore;

use self::auth::require_api_key;
use self::handlers::*;

pub struct AdminContext {
    pub registry: Arc<Registry>,
    pub store: Arc<dyn CoordinationStore>,
    pub api_key: String,
    pub health_client: reqwest::Client,
}

/// 256 random bits, hex-encoded. Printed once at startup; there is no
/// other way to obtain it.
pub fn generate_api_key() -> String {
    let mut key = [0u8; 32];
    rand::thread_rng().fill(&mut key);
    key.iter().map(|b| format!("{b:02x}")).collect()
}

pub fn router(ctx: Arc<AdminContext>) -> Router {
    Router::new()
        .route("/status", get(get_status))
        .route("/proxies", get(get_proxies))
        .route("/rotate", post(rotate_now))
        .route("/directives", post(post_directive))
        .layer(middleware::from_fn_with_state(ctx.clone(), require_api_key))
        .with_state(ctx)
}
