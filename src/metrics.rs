//! Prometheus metrics for Portico.
//!
//! Installs a global Prometheus recorder using `metrics-exporter-prometheus`,
//! defines metric name constants, provides a Tower-compatible middleware for
//! HTTP RED metrics, and exposes the `/metrics` endpoint handler.

use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Instant;

// -- Metric name constants ----------------------------------------------------

/// Total HTTP requests (counter). Labels: method, path, status.
pub const HTTP_REQUESTS_TOTAL: &str = "portico_http_requests_total";

/// HTTP request duration in seconds (histogram). Labels: method, path.
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "portico_http_request_duration_seconds";

/// Gateway operations (counter). Labels: operation, outcome.
pub const GATEWAY_OPERATIONS_TOTAL: &str = "portico_gateway_operations_total";

/// Records offered to the log sink (counter). Labels: sink, written.
pub const LOG_RECORDS_TOTAL: &str = "portico_log_records_total";

/// File bytes accepted by uploads (counter).
pub const BYTES_UPLOADED_TOTAL: &str = "portico_bytes_uploaded_total";

/// File bytes served by downloads (counter).
pub const BYTES_DOWNLOADED_TOTAL: &str = "portico_bytes_downloaded_total";

// -- Global recorder installation ---------------------------------------------

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global Prometheus metrics recorder. Idempotent, so tests may
/// call it repeatedly. Returns the global handle.
pub fn init_metrics() -> &'static PrometheusHandle {
    PROMETHEUS_HANDLE.get_or_init(|| {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        if let Err(e) = metrics::set_global_recorder(recorder) {
            tracing::warn!("Metrics recorder not installed: {}", e);
        }
        handle
    })
}

/// Register metric descriptions with the global recorder. Call once after
/// `init_metrics()`.
pub fn describe_metrics() {
    describe_counter!(HTTP_REQUESTS_TOTAL, "Total HTTP requests");
    describe_histogram!(
        HTTP_REQUEST_DURATION_SECONDS,
        "HTTP request duration in seconds"
    );
    describe_counter!(GATEWAY_OPERATIONS_TOTAL, "Gateway operations by type and outcome");
    describe_counter!(LOG_RECORDS_TOTAL, "Log records offered to the configured sink");
    describe_counter!(BYTES_UPLOADED_TOTAL, "Total file bytes uploaded");
    describe_counter!(BYTES_DOWNLOADED_TOTAL, "Total file bytes downloaded");
}

/// Count one gateway operation.
pub fn record_operation(operation: &'static str, ok: bool) {
    let outcome = if ok { "ok" } else { "error" };
    counter!(GATEWAY_OPERATIONS_TOTAL, "operation" => operation, "outcome" => outcome).increment(1);
}

// -- Metrics middleware -------------------------------------------------------

/// Axum middleware that records HTTP RED metrics for every request.
///
/// Excludes `/metrics` from self-instrumentation.
/// Must be the outermost layer so it captures the full request lifecycle.
pub async fn metrics_middleware(
    req: Request<axum::body::Body>,
    next: axum::middleware::Next,
) -> Response {
    if req.uri().path() == "/metrics" {
        return next.run(req).await;
    }

    let method = req.method().to_string();
    let path = normalize_path(req.uri().path());

    let start = Instant::now();
    let response = next.run(req).await;
    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    counter!(HTTP_REQUESTS_TOTAL, "method" => method.clone(), "path" => path, "status" => status).increment(1);
    histogram!(HTTP_REQUEST_DURATION_SECONDS, "method" => method, "path" => path).record(duration);

    response
}

// -- Path normalization -------------------------------------------------------

/// Map a request path to its route template so labels stay low-cardinality.
///
/// Examples:
/// - `/api/v1/ping/hello` -> `/api/v1/ping/{msg}`
/// - `/api/v1/file/abc.png` -> `/api/v1/file/{name}`
/// - `/api/login/client-7` -> `/api/login/{id}`
/// - anything unrouted -> `/other`
fn normalize_path(path: &str) -> &'static str {
    let trimmed = path.trim_end_matches('/');
    let segments: Vec<&str> = trimmed.split('/').skip(1).collect();
    match segments.as_slice() {
        [] => "/",
        ["health"] => "/health",
        ["metrics"] => "/metrics",
        ["openapi.json"] => "/openapi.json",
        ["api", "v1", "ping"] => "/api/v1/ping",
        ["api", "v1", "ping", _] => "/api/v1/ping/{msg}",
        ["api", "v1", "forecast"] => "/api/v1/forecast",
        ["api", "login"] => "/api/login",
        ["api", "login", _] => "/api/login/{id}",
        ["api", "token"] => "/api/token",
        ["api", "v1", "logout"] => "/api/v1/logout",
        ["api", "v1", "file"] => "/api/v1/file",
        ["api", "v1", "file", ..] => "/api/v1/file/{name}",
        ["api", "v1", "log"] => "/api/v1/log",
        _ => "/other",
    }
}

// -- Metrics endpoint handler -------------------------------------------------

/// `GET /metrics`: render Prometheus exposition format text.
pub async fn metrics_handler() -> Response {
    match PROMETHEUS_HANDLE.get() {
        Some(handle) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "metrics recorder not initialized").into_response(),
    }
}

// -- Tests --------------------------------------------------------------------
