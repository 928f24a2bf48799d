//! Registration endpoints for users and their subjects, plus the attendance
//! ledger read path.

use axum::{
    extract::{Path, State},
    Json,
};
use domain::models::attendance::{normalize_month_key, AttendanceRecord};
use domain::models::subject::{Subject, UpsertSubjectRequest};
use domain::models::user::{UpsertUserRequest, UserResponse, UserUpsert};
use shared::validation::validate_identifier;
use tracing::info;
use validator::Validate;

use crate::app::AppState;
use crate::error::ApiError;

fn check_identifier(kind: &str, value: &str) -> Result<(), ApiError> {
    validate_identifier(value).map_err(|e| {
        ApiError::Validation(format!(
            "{}: {}",
            kind,
            e.message.map(|m| m.to_string()).unwrap_or_default()
        ))
    })
}

/// Create or update a user.
///
/// PUT /api/v1/users/:user_id
pub async fn upsert_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Json(request): Json<UpsertUserRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    check_identifier("userId", &user_id)?;
    request.validate()?;

    let user = state
        .engine
        .store()
        .upsert_user(UserUpsert {
            user_id,
            display_name: request.display_name,
            push_token: request.push_token,
        })
        .await?;

    info!(user_id = %user.user_id, has_push_token = user.push_address().is_some(), "User upserted");
    Ok(Json(user.into()))
}

/// Create or replace a subject for an existing user.
///
/// PUT /api/v1/users/:user_id/subjects/:subject_id
pub async fn upsert_subject(
    State(state): State<AppState>,
    Path((user_id, subject_id)): Path<(String, String)>,
    Json(request): Json<UpsertSubjectRequest>,
) -> Result<Json<Subject>, ApiError> {
    check_identifier("userId", &user_id)?;
    check_identifier("subjectId", &subject_id)?;
    request.validate()?;

    let subject = state
        .engine
        .store()
        .upsert_subject(request.into_upsert(user_id, subject_id))
        .await?;

    info!(
        user_id = %subject.user_id,
        subject_id = %subject.subject_id,
        has_location = subject.location.is_some(),
        auto_verify = subject.is_auto_verified(),
        "Subject upserted"
    );
    Ok(Json(subject))
}

/// Read one month of the attendance ledger.
///
/// GET /api/v1/users/:user_id/subjects/:subject_id/attendance/:month_key
///
/// `month_key` is `<month name> <year>`, matched case-insensitively
/// (`March%202025`).
pub async fn get_attendance(
    State(state): State<AppState>,
    Path((user_id, subject_id, month_key)): Path<(String, String, String)>,
) -> Result<Json<AttendanceRecord>, ApiError> {
    let month_key = normalize_month_key(&month_key).ok_or_else(|| {
        ApiError::Validation(format!(
            "monthKey must look like 'march 2025', got '{}'",
            month_key
        ))
    })?;

    let store = state.engine.store();
    if store.get_subject(&user_id, &subject_id).await?.is_none() {
        return Err(ApiError::NotFound(format!(
            "Subject {} not found for user {}",
            subject_id, user_id
        )));
    }

    let record = store
        .get_attendance(&user_id, &subject_id, &month_key)
        .await?;
    Ok(Json(record))
}
