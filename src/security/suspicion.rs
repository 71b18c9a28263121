//! Suspicion scoring.
//!
//! A per-source-IP rating lives in the coordination store under
//! `suspicion:<ip>` so every listener shares the same view of a client.
//! Detected attacks raise the rating by 5, ordinary traffic by 1; above
//! the configured maximum the entry point refuses the source outright.

use std::sync::Arc;

use crate::rules::RequestMeta;
use crate::store::{CoordinationStore, StoreError};

/// Rating above which a source IP is refused.
pub const DEFAULT_MAX_SUSPICION: i64 = 20;

/// Rating increase for a request the heuristics flag.
pub const ATTACK_PENALTY: i64 = 5;

/// Rating increase for any other request.
pub const BASELINE_INCREMENT: i64 = 1;

const SUSPICION_KEY_PREFIX: &str = "suspicion:";

// Substrings (lowercased) that mark a request line as hostile.
const URI_MARKERS: &[&str] = &[
    "../",
    "..%2f",
    "%2e%2e",
    "/etc/passwd",
    "<script",
    "%3cscript",
    "union select",
    "union+select",
    "' or ",
    "\" or ",
    "or 1=1",
    "; drop table",
    "sleep(",
    "benchmark(",
];

// User-agent fragments of common scanners.
const SCANNER_AGENTS: &[&str] = &["sqlmap", "nikto", "nmap", "masscan", "dirbuster", "wpscan"];

pub struct SuspicionTracker {
    store: Arc<dyn CoordinationStore>,
    max_suspicion: i64,
}

impl SuspicionTracker {
    pub fn new(store: Arc<dyn CoordinationStore>, max_suspicion: i64) -> Self {
        Self {
            store,
            max_suspicion,
        }
    }

    pub fn max_suspicion(&self) -> i64 {
        self.max_suspicion
    }

    /// Heuristic attack check over method, URI, and headers. Cheap by
    /// construction; the real classifier lives behind the detection client.
    pub fn detect_attack(meta: &RequestMeta<'_>) -> bool {
        if meta.method == axum::http::Method::TRACE || meta.method == axum::http::Method::CONNECT {
            return true;
        }

        let uri = meta
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/")
            .to_ascii_lowercase();
        if URI_MARKERS.iter().any(|marker| uri.contains(marker)) {
            return true;
        }

        meta.headers
            .get(axum::http::header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(|ua| {
                let ua = ua.to_ascii_lowercase();
                SCANNER_AGENTS.iter().any(|agent| ua.contains(agent))
            })
            .unwrap_or(false)
    }

    /// Atomically raise the rating of `ip` by `delta`.
    pub async fn update_rating(&self, ip: &str, delta: i64) -> Result<i64, StoreError> {
        self.store
            .incr(&format!("{SUSPICION_KEY_PREFIX}{ip}"), delta)
            .await
    }

    pub async fn get_rating(&self, ip: &str) -> Result<i64, StoreError> {
        let value = self
            .store
            .get(&format!("{SUSPICION_KEY_PREFIX}{ip}"))
            .await?;
        Ok(value.and_then(|v| v.parse::<i64>().ok()).unwrap_or(0))
    }

    /// True when `ip` has crossed the refusal threshold.
    pub async fn is_banned(&self, ip: &str) -> Result<bool, StoreError> {
        Ok(self.get_rating(ip).await? > self.max_suspicion)
    }
}
