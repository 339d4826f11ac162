//! Prometheus metrics for application observability.
//!
//! Metrics are exposed on a dedicated listener (default `0.0.0.0:9090`).
//!
//! # Available Metrics
//!
//! ## Counters
//! - `http_requests_total` - Requests handled (labels: route, method, status)
//! - `rate_limit_rejections_total` - Requests rejected by the rate limiter (labels: tier)
//! - `http_errors_total` - Normalized error responses (labels: error, status)
//!
//! ## Histograms
//! - `http_request_duration_seconds` - Request duration (labels: route, method, status)
//!
//! ## Gauges
//! - `rate_limit_records` - Live counter records in the rate limit store
//!
//! Recording functions are no-ops until a recorder is installed, so tests and
//! deployments with `METRICS_PORT=0` can call them freely.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::{error, info};

/// Metric names as constants for consistency.
pub mod names {
    pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";
    pub const RATE_LIMIT_REJECTIONS_TOTAL: &str = "rate_limit_rejections_total";
    pub const HTTP_ERRORS_TOTAL: &str = "http_errors_total";
    pub const RATE_LIMIT_RECORDS: &str = "rate_limit_records";
}

/// Install the Prometheus exporter and describe all metrics.
///
/// # Errors
///
/// Fails when the listener cannot be installed (e.g. a recorder is already
/// set).
pub fn init_metrics(metrics_addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(names::HTTP_REQUESTS_TOTAL, "Total number of HTTP requests handled");
    describe_counter!(
        names::RATE_LIMIT_REJECTIONS_TOTAL,
        "Total number of requests rejected by the rate limiter"
    );
    describe_counter!(
        names::HTTP_ERRORS_TOTAL,
        "Total number of normalized error responses"
    );
    describe_histogram!(
        names::HTTP_REQUEST_DURATION_SECONDS,
        "HTTP request duration in seconds"
    );
    describe_gauge!(
        names::RATE_LIMIT_RECORDS,
        "Live counter records held by the rate limit store"
    );

    info!(addr = %metrics_addr, "Prometheus metrics endpoint started");
    Ok(())
}

/// Try to initialize metrics, logging any errors but not failing.
pub fn try_init_metrics(metrics_addr: SocketAddr) {
    if let Err(e) = init_metrics(metrics_addr) {
        error!(error = %e, "Failed to initialize metrics, continuing without metrics");
    }
}

/// Record a completed request.
pub fn record_request(route: &str, method: &str, status: u16, duration_secs: f64) {
    let status = status.to_string();
    counter!(names::HTTP_REQUESTS_TOTAL, "route" => route.to_string(), "method" => method.to_string(), "status" => status.clone())
        .increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, "route" => route.to_string(), "method" => method.to_string(), "status" => status)
        .record(duration_secs);
}

/// Record a rate limit rejection.
pub fn record_rate_limit_rejection(tier: &str) {
    counter!(names::RATE_LIMIT_REJECTIONS_TOTAL, "tier" => tier.to_string()).increment(1);
}

/// Record a normalized error response.
pub fn record_error(error: &str, status: u16) {
    counter!(names::HTTP_ERRORS_TOTAL, "error" => error.to_string(), "status" => status.to_string())
        .increment(1);
}

/// Update the live record gauge.
pub fn set_rate_limit_records(count: usize) {
    gauge!(names::RATE_LIMIT_RECORDS).set(count as f64);
}
