//! Prometheus metrics: HTTP middleware, attendance counters and the
//! exposition endpoint.

use std::sync::OnceLock;
use std::time::Instant;

use axum::{
    body::Body,
    extract::MatchedPath,
    http::{header, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use domain::models::JobOutcome;
use domain::services::{QueueReport, ScanReport};
use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Records `http_requests_total{method,path,status}` and
/// `http_request_duration_seconds{method,path}`.
pub async fn metrics_middleware(req: Request<Body>, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().as_str().to_string();
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(req).await;

    let status = response.status().as_u16().to_string();
    counter!(
        "http_requests_total",
        "method" => method.clone(),
        "path" => path.clone(),
        "status" => status
    )
    .increment(1);
    histogram!(
        "http_request_duration_seconds",
        "method" => method,
        "path" => path
    )
    .record(start.elapsed().as_secs_f64());

    response
}

pub fn record_scan(report: &ScanReport) {
    counter!("attendance_jobs_created_total").increment(report.jobs_created as u64);
    if report.failed_units > 0 {
        counter!("attendance_scan_failures_total").increment(report.failed_units as u64);
    }
}

pub fn record_queue_pass(report: &QueueReport) {
    let dispatch = [
        ("sent", report.dispatched),
        ("failed", report.dispatch_failed),
        ("expired", report.expired),
    ];
    for (result, count) in dispatch {
        if count > 0 {
            counter!("attendance_dispatch_total", "result" => result).increment(count as u64);
        }
    }
    for (outcome, count) in [("present", report.present), ("absent", report.absent)] {
        if count > 0 {
            counter!("attendance_decisions_total", "outcome" => outcome).increment(count as u64);
        }
    }
}

/// Counts an accepted sample and, when it resolved a job, the decision.
pub fn record_location_received(resolved: Option<JobOutcome>) {
    counter!("location_samples_received_total").increment(1);
    if resolved == Some(JobOutcome::Present) {
        counter!("attendance_decisions_total", "outcome" => "present").increment(1);
    }
}

/// Installs the global Prometheus recorder. Safe to call more than once;
/// later calls keep the first recorder.
pub fn init_metrics() -> Result<(), BuildError> {
    if PROMETHEUS_HANDLE.get().is_some() {
        return Ok(());
    }
    let handle = PrometheusBuilder::new()
        .set_buckets(&[0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0])?
        .install_recorder()?;
    let _ = PROMETHEUS_HANDLE.set(handle);
    Ok(())
}

/// GET /metrics
pub async fn metrics_handler() -> Response {
    match PROMETHEUS_HANDLE.get() {
        Some(handle) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            [(header::CONTENT_TYPE, "text/plain")],
            "Metrics not initialized",
        )
            .into_response(),
    }
}
