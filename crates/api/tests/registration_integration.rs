//! Integration tests for user/subject registration and ledger reads.

mod common;

use axum::http::{Method, StatusCode};
use common::{create_test_app, every_day, json_request, parse_response_body, register_user};
use serde_json::json;

#[tokio::test]
async fn test_upsert_user_hides_push_token() {
    let app = create_test_app();

    let response = app
        .send(json_request(
            Method::PUT,
            "/api/v1/users/stu-1",
            json!({"displayName": "Ada", "pushToken": "secret-device-token"}),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = parse_response_body(response).await;
    assert_eq!(body["userId"], "stu-1");
    assert_eq!(body["displayName"], "Ada");
    assert_eq!(body["hasPushToken"], true);
    assert!(!body.to_string().contains("secret-device-token"));
}

#[tokio::test]
async fn test_upsert_user_rejects_empty_push_token() {
    let app = create_test_app();

    let response = app
        .send(json_request(
            Method::PUT,
            "/api/v1/users/stu-1",
            json!({"pushToken": ""}),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = parse_response_body(response).await;
    assert_eq!(body["error"], "validation_error");
}

#[tokio::test]
async fn test_upsert_subject_defaults_radius() {
    let app = create_test_app();
    register_user(&app, "stu-1", Some("tok")).await;

    let response = app
        .send(json_request(
            Method::PUT,
            "/api/v1/users/stu-1/subjects/physics",
            json!({
                "name": "Physics",
                "schedule": every_day("9:00", "10:30"),
                "location": {"latitude": 48.15, "longitude": 17.07}
            }),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = parse_response_body(response).await;
    assert_eq!(body["subjectId"], "physics");
    assert_eq!(body["location"]["radiusMeters"], 50.0);
    assert_eq!(body["schedule"]["Monday"]["start"], "9:00");
}

#[tokio::test]
async fn test_upsert_subject_for_unknown_user_is_not_found() {
    let app = create_test_app();

    let response = app
        .send(json_request(
            Method::PUT,
            "/api/v1/users/ghost/subjects/physics",
            json!({"name": "Physics"}),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_upsert_subject_rejects_out_of_range_latitude() {
    let app = create_test_app();
    register_user(&app, "stu-1", Some("tok")).await;

    let response = app
        .send(json_request(
            Method::PUT,
            "/api/v1/users/stu-1/subjects/physics",
            json!({
                "name": "Physics",
                "location": {"latitude": 91.0, "longitude": 17.07}
            }),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = parse_response_body(response).await;
    assert!(body["message"]
        .as_str()
        .unwrap()
        .starts_with("location.latitude"));
}

#[tokio::test]
async fn test_attendance_for_new_month_is_empty() {
    let app = create_test_app();
    register_user(&app, "stu-1", Some("tok")).await;
    app.send(json_request(
        Method::PUT,
        "/api/v1/users/stu-1/subjects/physics",
        json!({"name": "Physics"}),
    ))
    .await;

    let response = app
        .send(common::empty_request(
            Method::GET,
            "/api/v1/users/stu-1/subjects/physics/attendance/March%202025",
        ))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = parse_response_body(response).await;
    assert_eq!(body["monthKey"], "march 2025");
    assert_eq!(body["present"], json!([]));
    assert_eq!(body["absent"], json!([]));
}

#[tokio::test]
async fn test_attendance_rejects_malformed_month_key() {
    let app = create_test_app();
    register_user(&app, "stu-1", Some("tok")).await;

    let response = app
        .send(common::empty_request(
            Method::GET,
            "/api/v1/users/stu-1/subjects/physics/attendance/2025-03",
        ))
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_attendance_for_unknown_subject_is_not_found() {
    let app = create_test_app();
    register_user(&app, "stu-1", Some("tok")).await;

    let response = app
        .send(common::empty_request(
            Method::GET,
            "/api/v1/users/stu-1/subjects/history/attendance/march%202025",
        ))
        .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
