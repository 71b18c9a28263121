//! Endpoint health probing.
//!
//! # Responsibilities
//! - Probe a proxy endpoint's `/health` route
//! - Report plain healthy/unhealthy to the admin surface
//!
//! # Design Decisions
//! - Dedicated short-timeout client, separate from the forwarding client
//! - Certificate verification is skipped: internal endpoints answer on
//!   their public name with whatever certificate the process was given

use std::time::Duration;

const HEALTH_TIMEOUT: Duration = Duration::from_secs(2);

/// Build the probing client.
pub fn probe_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .timeout(HEALTH_TIMEOUT)
        .danger_accept_invalid_certs(true)
        .build()
}

/// True when `endpoint_url` answers 200 on `/health` within the timeout.
pub async fn probe(client: &reqwest::Client, endpoint_url: &str) -> bool {
    match client.get(format!("{endpoint_url}/health")).send().await {
        Ok(response) if response.status().is_success() => true,
        Ok(response) => {
            tracing::warn!(url = %endpoint_url, status = %response.status(), "health check failed");
            false
        }
        Err(e) => {
            tracing::warn!(url = %endpoint_url, error = %e, "health check failed");
            false
        }
    }
}
