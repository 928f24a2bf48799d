//! Location submission endpoint.

use axum::{extract::State, http::StatusCode, Json};
use chrono::{TimeZone, Utc};
use domain::models::location_sample::{SubmitLocationRequest, SubmitLocationResponse};
use domain::services::LocationSubmission;
use tracing::info;
use validator::Validate;

use crate::app::AppState;
use crate::error::ApiError;
use crate::middleware::metrics::record_location_received;

/// Accept a device location sample.
///
/// POST /api/v1/locations
///
/// The sample is stored whether or not a job is waiting for it. When it lands
/// inside an open grace window and within the geofence, the day is decided
/// immediately and the outcome is returned.
pub async fn submit_location(
    State(state): State<AppState>,
    Json(request): Json<SubmitLocationRequest>,
) -> Result<(StatusCode, Json<SubmitLocationResponse>), ApiError> {
    request.validate()?;

    let captured_at = match request.capture_time {
        Some(millis) => Some(
            Utc.timestamp_millis_opt(millis)
                .single()
                .ok_or_else(|| ApiError::Validation("Invalid capture time".to_string()))?,
        ),
        None => None,
    };

    let outcome = state
        .engine
        .submit_location(LocationSubmission {
            user_id: request.user_id,
            subject_id: request.subject_id,
            latitude: request.latitude,
            longitude: request.longitude,
            captured_at,
        })
        .await?;
    record_location_received(outcome.resolved);

    info!(
        user_id = %outcome.sample.user_id,
        subject_id = %outcome.sample.subject_id,
        resolved = ?outcome.resolved,
        "Location sample accepted"
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitLocationResponse {
            accepted: true,
            evaluated: outcome.resolved.is_some(),
            outcome: outcome.resolved,
        }),
    ))
}
