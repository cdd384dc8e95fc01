//! Metrics for outbound media requests.

use metrics::{counter, histogram};

/// Metric name constants for consistency.
pub mod names {
    /// Outbound requests by operation and status.
    pub const REQUESTS_TOTAL: &str = "mylo_media_requests_total";

    /// Request latency in seconds by operation.
    pub const LATENCY_SECONDS: &str = "mylo_media_latency_seconds";
}

/// Record a completed outbound request. Status `0` marks a transport failure.
pub fn record_request(operation: &str, status: u16, latency_secs: f64) {
    counter!(
        names::REQUESTS_TOTAL,
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    histogram!(
        names::LATENCY_SECONDS,
        "operation" => operation.to_string()
    )
    .record(latency_secs);
}
