//! Metrics collection and exposition.

use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder. The returned handle renders the text
/// exposition for the entry point's `/metrics` route.
pub fn install() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Record one handled request on a proxy worker.
pub fn record_request(proxy_id: &str, status: u16, method: &str, start: Instant) {
    let count_labels = [
        ("proxy_id", proxy_id.to_string()),
        ("status", status.to_string()),
        ("method", method.to_string()),
    ];
    counter!("proxy_requests_total", &count_labels).increment(1);

    let duration_labels = [
        ("proxy_id", proxy_id.to_string()),
        ("method", method.to_string()),
    ];
    histogram!("proxy_request_duration_seconds", &duration_labels)
        .record(start.elapsed().as_secs_f64());
}

/// Record a proxy switch.
pub fn record_switch(proxy_id: &str) {
    counter!("proxy_switches_total", "proxy_id" => proxy_id.to_string()).increment(1);
}
