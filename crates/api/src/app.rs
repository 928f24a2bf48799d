use std::sync::Arc;
use std::time::Duration;

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use domain::services::{
    AttendanceEngine, AttendanceStore, MockNotificationService, NotificationService,
};
use tower_http::{compression::CompressionLayer, timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::{Config, ConfigValidationError, FcmConfig};
use crate::middleware::{metrics_handler, metrics_middleware, trace_id};
use crate::routes::{health, locations, operations, users};
use crate::services::FcmNotificationService;

#[derive(Clone)]
pub struct AppState {
    pub engine: AttendanceEngine,
    pub config: Arc<Config>,
}

/// Picks the push transport: FCM when enabled, otherwise a logging mock.
pub fn build_notifier(config: &FcmConfig) -> Arc<dyn NotificationService> {
    if !config.enabled {
        tracing::warn!("FCM disabled; location requests will only be logged");
        return Arc::new(MockNotificationService::new());
    }
    match FcmNotificationService::new(config.clone()) {
        Ok(service) => Arc::new(service),
        Err(e) => {
            tracing::error!(error = %e, "FCM initialization failed; falling back to logging");
            Arc::new(MockNotificationService::new())
        }
    }
}

/// Builds the engine over `store` using the scheduler and FCM sections.
pub fn build_engine(
    config: &Config,
    store: Arc<dyn AttendanceStore>,
    notifier: Arc<dyn NotificationService>,
) -> Result<AttendanceEngine, ConfigValidationError> {
    let settings = config.scheduler.engine_settings()?;
    Ok(AttendanceEngine::new(store, notifier, settings))
}

pub fn create_app(config: Config, engine: AttendanceEngine) -> Router {
    let config = Arc::new(config);
    let request_timeout = Duration::from_secs(config.server.request_timeout_secs);

    let state = AppState {
        engine,
        config,
    };

    let public_routes = Router::new()
        .route("/api/health", get(health::health_check))
        .route("/api/health/ready", get(health::ready))
        .route("/api/health/live", get(health::live))
        .route("/metrics", get(metrics_handler));

    let api_routes = Router::new()
        .route("/api/v1/locations", post(locations::submit_location))
        .route("/api/v1/users/:user_id", put(users::upsert_user))
        .route(
            "/api/v1/users/:user_id/subjects/:subject_id",
            put(users::upsert_subject),
        )
        .route(
            "/api/v1/users/:user_id/subjects/:subject_id/attendance/:month_key",
            get(users::get_attendance),
        )
        .route("/api/v1/operations/scan", post(operations::trigger_scan))
        .route(
            "/api/v1/operations/process-queue",
            post(operations::process_queue),
        )
        .route("/api/v1/operations/status", get(operations::status));

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        // Bottom layers run first
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(request_timeout))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(trace_id))
        .with_state(state)
}
