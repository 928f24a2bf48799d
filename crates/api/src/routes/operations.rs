//! Operator endpoints: manual scan/queue passes and the open-job view.

use axum::{extract::State, Json};
use domain::models::trigger_job::OpenJobsResponse;
use domain::services::{QueueReport, ScanReport};

use crate::app::AppState;
use crate::error::ApiError;
use crate::middleware::metrics::{record_queue_pass, record_scan};

/// POST /api/v1/operations/scan
///
/// Waits for a scan already in progress instead of overlapping it.
pub async fn trigger_scan(State(state): State<AppState>) -> Result<Json<ScanReport>, ApiError> {
    let report = state.engine.trigger_scan_now().await?;
    record_scan(&report);
    Ok(Json(report))
}

/// POST /api/v1/operations/process-queue
pub async fn process_queue(
    State(state): State<AppState>,
) -> Result<Json<QueueReport>, ApiError> {
    let report = state.engine.trigger_queue_processing_now().await?;
    record_queue_pass(&report);
    Ok(Json(report))
}

/// GET /api/v1/operations/status
pub async fn status(State(state): State<AppState>) -> Result<Json<OpenJobsResponse>, ApiError> {
    Ok(Json(state.engine.open_jobs().await?))
}
