//! End-to-end attendance flow through the HTTP surface: registration,
//! schedule scan, dispatch, location submission and ledger read.

mod common;

use axum::http::{Method, StatusCode};
use chrono::Datelike;
use common::{
    create_test_app, create_test_app_with, empty_request, json_request, parse_response_body,
    register_running_subject, register_user,
};
use domain::services::MockNotificationService;
use serde_json::json;

#[tokio::test]
async fn test_scan_dispatch_and_in_range_location_marks_present() {
    let app = create_test_app();
    register_user(&app, "stu-1", Some("device-token-1")).await;
    register_running_subject(&app, "stu-1", "linalg").await;

    let response = app
        .send(empty_request(Method::POST, "/api/v1/operations/scan"))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let scan = parse_response_body(response).await;
    assert_eq!(scan["jobsCreated"], 1);

    let status = parse_response_body(
        app.send(empty_request(Method::GET, "/api/v1/operations/status"))
            .await,
    )
    .await;
    assert_eq!(status["pendingCount"], 1);
    assert_eq!(status["jobs"][0]["subjectId"], "linalg");

    let response = app
        .send(empty_request(Method::POST, "/api/v1/operations/process-queue"))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let queue = parse_response_body(response).await;
    assert_eq!(queue["dispatched"], 1);

    let sent = app.notifier.sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "device-token-1");
    assert_eq!(sent[0].1.subject_id, "linalg");

    let response = app
        .send(json_request(
            Method::POST,
            "/api/v1/locations",
            json!({
                "userId": "stu-1",
                "subjectId": "linalg",
                "latitude": 0.0001,
                "longitude": 0.0
            }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = parse_response_body(response).await;
    assert_eq!(body["accepted"], true);
    assert_eq!(body["evaluated"], true);
    assert_eq!(body["outcome"], "present");

    let uri = format!(
        "/api/v1/users/stu-1/subjects/linalg/attendance/{}",
        app.month_key().replace(' ', "%20")
    );
    let response = app.send(empty_request(Method::GET, &uri)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let record = parse_response_body(response).await;
    let day = app.local_date().day();
    assert_eq!(record["present"], json!([day]));
    assert_eq!(record["absent"], json!([]));

    let status = parse_response_body(
        app.send(empty_request(Method::GET, "/api/v1/operations/status"))
            .await,
    )
    .await;
    assert_eq!(status["jobs"], json!([]));
}

#[tokio::test]
async fn test_repeated_scans_create_one_job_per_day() {
    let app = create_test_app();
    register_user(&app, "stu-1", Some("device-token-1")).await;
    register_running_subject(&app, "stu-1", "linalg").await;

    for expected in [1, 0, 0] {
        let scan = parse_response_body(
            app.send(empty_request(Method::POST, "/api/v1/operations/scan"))
                .await,
        )
        .await;
        assert_eq!(scan["jobsCreated"], expected);
    }
    assert_eq!(app.store.all_jobs().await.len(), 1);
}

#[tokio::test]
async fn test_user_without_push_token_gets_no_job() {
    let app = create_test_app();
    register_user(&app, "stu-2", None).await;
    register_running_subject(&app, "stu-2", "linalg").await;

    let scan = parse_response_body(
        app.send(empty_request(Method::POST, "/api/v1/operations/scan"))
            .await,
    )
    .await;

    assert_eq!(scan["jobsCreated"], 0);
    assert!(app.store.all_jobs().await.is_empty());
}

#[tokio::test]
async fn test_failed_push_resolves_job_without_marking_day() {
    let app = create_test_app_with(MockNotificationService::failing());
    register_user(&app, "stu-3", Some("device-token-3")).await;
    register_running_subject(&app, "stu-3", "linalg").await;

    app.send(empty_request(Method::POST, "/api/v1/operations/scan"))
        .await;
    let queue = parse_response_body(
        app.send(empty_request(Method::POST, "/api/v1/operations/process-queue"))
            .await,
    )
    .await;
    assert_eq!(queue["dispatchFailed"], 1);

    let status = parse_response_body(
        app.send(empty_request(Method::GET, "/api/v1/operations/status"))
            .await,
    )
    .await;
    assert_eq!(status["jobs"], json!([]));

    let uri = format!(
        "/api/v1/users/stu-3/subjects/linalg/attendance/{}",
        app.month_key().replace(' ', "%20")
    );
    let record = parse_response_body(app.send(empty_request(Method::GET, &uri)).await).await;
    assert_eq!(record["present"], json!([]));
    assert_eq!(record["absent"], json!([]));
}

#[tokio::test]
async fn test_out_of_range_location_leaves_job_open() {
    let app = create_test_app();
    register_user(&app, "stu-4", Some("device-token-4")).await;
    register_running_subject(&app, "stu-4", "linalg").await;
    app.send(empty_request(Method::POST, "/api/v1/operations/scan"))
        .await;
    app.send(empty_request(Method::POST, "/api/v1/operations/process-queue"))
        .await;

    let response = app
        .send(json_request(
            Method::POST,
            "/api/v1/locations",
            json!({
                "userId": "stu-4",
                "subjectId": "linalg",
                "latitude": 0.01,
                "longitude": 0.0
            }),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = parse_response_body(response).await;
    assert_eq!(body["evaluated"], false);
    assert!(body.get("outcome").is_none());

    let status = parse_response_body(
        app.send(empty_request(Method::GET, "/api/v1/operations/status"))
            .await,
    )
    .await;
    assert_eq!(status["pendingCount"], 0);
    assert_eq!(status["jobs"][0]["status"], "dispatched");
}
