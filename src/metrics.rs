//! Prometheus metrics for the relay.
//!
//! All recording functions go through the `metrics` facade, so they are
//! no-ops until [`install`] registers the Prometheus recorder (tests never
//! do).

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::time::Instant;

/// Install the global Prometheus recorder and return a render handle.
pub fn install() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus recorder: {e}"))
}

/// Count a completed relay request.
///
/// `kind` is `playlist`, `passthrough` or `error`.
pub fn record_request(kind: &'static str, status: u16) {
    counter!(
        "relay_requests_total",
        "kind" => kind,
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record time from request admission to response headers.
pub fn record_duration(kind: &'static str, start: Instant) {
    histogram!("relay_request_duration_seconds", "kind" => kind)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_upstream_error() {
    counter!("relay_upstream_errors_total").increment(1);
}

pub fn record_rewritten_lines(count: usize) {
    counter!("relay_playlist_uris_rewritten_total").increment(count as u64);
}

pub fn record_bytes_streamed(bytes: usize) {
    counter!("relay_bytes_streamed_total").increment(bytes as u64);
}
