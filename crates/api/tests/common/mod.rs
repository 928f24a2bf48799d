//! Common test utilities for integration tests.
//!
//! Every test gets its own router over a fresh in-memory store. The engine's
//! UTC offset is chosen so that campus-local time is close to noon whenever
//! the test runs, which keeps schedule-dependent assertions stable.

#![allow(dead_code)]

use std::sync::Arc;

use attendance_api::{app, config::Config};
use axum::{
    body::Body,
    http::{header, Method, Request, Response},
    Router,
};
use chrono::{Duration, NaiveDate, Timelike, Utc};
use domain::services::{InMemoryAttendanceStore, MockNotificationService};
use serde_json::{json, Value};
use tower::ServiceExt;

pub struct TestApp {
    pub router: Router,
    pub store: Arc<InMemoryAttendanceStore>,
    pub notifier: MockNotificationService,
    pub utc_offset_minutes: i32,
}

impl TestApp {
    /// Local calendar date the engine currently sees.
    pub fn local_date(&self) -> NaiveDate {
        (Utc::now() + Duration::minutes(i64::from(self.utc_offset_minutes))).date_naive()
    }

    /// Ledger month key for the local date, e.g. `march 2025`.
    pub fn month_key(&self) -> String {
        domain::models::attendance::month_key(self.local_date())
    }

    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }
}

/// Offset that puts local time at roughly 12:00.
pub fn noon_offset_minutes() -> i32 {
    let now = Utc::now();
    let minute_of_day = (now.hour() * 60 + now.minute()) as i32;
    12 * 60 - minute_of_day
}

pub fn test_config(overrides: &[(&str, &str)]) -> Config {
    Config::load_for_test(overrides).expect("Failed to load test config")
}

pub fn create_test_app() -> TestApp {
    create_test_app_with(MockNotificationService::new())
}

pub fn create_test_app_with(notifier: MockNotificationService) -> TestApp {
    let utc_offset_minutes = noon_offset_minutes();
    let offset = utc_offset_minutes.to_string();
    let config = test_config(&[("scheduler.utc_offset_minutes", offset.as_str())]);

    let store = Arc::new(InMemoryAttendanceStore::new());
    let engine = app::build_engine(&config, store.clone(), Arc::new(notifier.clone()))
        .expect("Failed to build engine");

    TestApp {
        router: app::create_app(config, engine),
        store,
        notifier,
        utc_offset_minutes,
    }
}

pub fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_string(&body).unwrap()))
        .unwrap()
}

pub fn empty_request(method: Method, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

pub async fn parse_response_body(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap_or(Value::Null)
}

/// Schedule with the same class every day, so the local weekday never matters.
pub fn every_day(start: &str, end: &str) -> Value {
    let mut schedule = serde_json::Map::new();
    for day in [
        "Monday",
        "Tuesday",
        "Wednesday",
        "Thursday",
        "Friday",
        "Saturday",
        "Sunday",
    ] {
        schedule.insert(day.to_string(), json!({"start": start, "end": end}));
    }
    Value::Object(schedule)
}

pub async fn register_user(app: &TestApp, user_id: &str, push_token: Option<&str>) {
    let response = app
        .send(json_request(
            Method::PUT,
            &format!("/api/v1/users/{}", user_id),
            json!({"displayName": "Test Student", "pushToken": push_token}),
        ))
        .await;
    assert!(response.status().is_success(), "user upsert failed");
}

/// Subject at (0, 0) with a 50 m radius whose class has been running since
/// 11:00 local and ends at 12:30, so its midpoint has already passed.
pub async fn register_running_subject(app: &TestApp, user_id: &str, subject_id: &str) {
    let response = app
        .send(json_request(
            Method::PUT,
            &format!("/api/v1/users/{}/subjects/{}", user_id, subject_id),
            json!({
                "name": "Linear Algebra",
                "schedule": every_day("11:00", "12:30"),
                "location": {"latitude": 0.0, "longitude": 0.0, "radius": 50.0},
                "autoVerify": true
            }),
        ))
        .await;
    assert!(response.status().is_success(), "subject upsert failed");
}
