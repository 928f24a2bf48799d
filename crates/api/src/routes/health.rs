//! Health check endpoint handlers.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::app::AppState;
use crate::error::ApiError;

/// Health check response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub storage: StorageHealth,
    pub scheduler: SchedulerHealth,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct StorageHealth {
    pub backend: String,
    pub connected: bool,
    pub latency_ms: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct SchedulerHealth {
    pub enabled: bool,
    pub trigger_policy: String,
    pub utc_offset_minutes: i32,
    pub push_enabled: bool,
}

/// Simple status response for liveness/readiness probes.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: String,
}

/// GET /api/health
pub async fn health_check(
    State(state): State<AppState>,
) -> (StatusCode, Json<HealthResponse>) {
    let start = std::time::Instant::now();
    let connected = state.engine.store().ping().await.is_ok();
    let latency_ms = start.elapsed().as_millis() as u64;

    let settings = state.engine.settings();
    let response = HealthResponse {
        status: if connected { "healthy" } else { "unhealthy" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        storage: StorageHealth {
            backend: format!("{:?}", state.config.storage.backend).to_lowercase(),
            connected,
            latency_ms: connected.then_some(latency_ms),
        },
        scheduler: SchedulerHealth {
            enabled: state.config.scheduler.enabled,
            trigger_policy: settings.trigger_policy.to_string(),
            utc_offset_minutes: settings.utc_offset.local_minus_utc() / 60,
            push_enabled: state.config.fcm.enabled,
        },
    };

    let status = if connected {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(response))
}

/// GET /api/health/live
pub async fn live() -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "alive".to_string(),
    })
}

/// GET /api/health/ready
pub async fn ready(State(state): State<AppState>) -> Result<Json<StatusResponse>, ApiError> {
    state
        .engine
        .store()
        .ping()
        .await
        .map_err(|e| ApiError::ServiceUnavailable(e.to_string()))?;

    Ok(Json(StatusResponse {
        status: "ready".to_string(),
    }))
}
