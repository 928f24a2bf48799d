//! Notification service for push notifications.
//!
//! Provides abstractions for asking a device to report its location.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

/// Notification type enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    LocationRequest,
}

impl std::fmt::Display for NotificationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotificationType::LocationRequest => write!(f, "location_request"),
        }
    }
}

/// Data-only message asking the device for a fresh location sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationRequestPayload {
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub user_id: String,
    pub subject_id: String,
    /// Trigger job id; echoed back in logs on both sides.
    pub correlation_id: Uuid,
    pub timestamp: DateTime<Utc>,
}

impl LocationRequestPayload {
    pub fn new(user_id: &str, subject_id: &str, correlation_id: Uuid, timestamp: DateTime<Utc>) -> Self {
        Self {
            notification_type: NotificationType::LocationRequest,
            user_id: user_id.to_string(),
            subject_id: subject_id.to_string(),
            correlation_id,
            timestamp,
        }
    }

    /// FCM data messages only carry string values.
    pub fn to_data_map(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("type".to_string(), self.notification_type.to_string()),
            ("userId".to_string(), self.user_id.clone()),
            ("subjectId".to_string(), self.subject_id.clone()),
            ("correlationId".to_string(), self.correlation_id.to_string()),
            ("timestamp".to_string(), self.timestamp.to_rfc3339()),
        ])
    }
}

/// Result of a notification send attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationResult {
    /// Notification was sent successfully.
    Sent,
    /// The user has no push token registered.
    NoToken,
    /// Notification sending failed.
    Failed(String),
}

/// Notification service trait for sending push notifications.
#[async_trait::async_trait]
pub trait NotificationService: Send + Sync {
    /// Ask the device behind `push_token` to submit its location.
    async fn send_location_request(
        &self,
        push_token: &str,
        payload: LocationRequestPayload,
    ) -> NotificationResult;
}

/// Mock notification service for development and testing.
///
/// Logs and records notifications but doesn't actually send them.
#[derive(Debug, Clone, Default)]
pub struct MockNotificationService {
    /// Whether to simulate failures for every token.
    pub simulate_failure: bool,
    failing_tokens: HashSet<String>,
    sent: Arc<Mutex<Vec<(String, LocationRequestPayload)>>>,
}

impl MockNotificationService {
    /// Create a new mock notification service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock service that simulates failures.
    pub fn failing() -> Self {
        Self {
            simulate_failure: true,
            ..Self::default()
        }
    }

    /// Fail only sends addressed to `push_token`.
    pub fn failing_for(mut self, push_token: &str) -> Self {
        self.failing_tokens.insert(push_token.to_string());
        self
    }

    /// Payloads accepted so far, with the token they were addressed to.
    pub async fn sent(&self) -> Vec<(String, LocationRequestPayload)> {
        self.sent.lock().await.clone()
    }
}

#[async_trait::async_trait]
impl NotificationService for MockNotificationService {
    async fn send_location_request(
        &self,
        push_token: &str,
        payload: LocationRequestPayload,
    ) -> NotificationResult {
        if self.simulate_failure || self.failing_tokens.contains(push_token) {
            tracing::warn!(
                user_id = %payload.user_id,
                correlation_id = %payload.correlation_id,
                "Mock notification service simulating failure"
            );
            return NotificationResult::Failed("Simulated failure".to_string());
        }

        tracing::info!(
            user_id = %payload.user_id,
            subject_id = %payload.subject_id,
            correlation_id = %payload.correlation_id,
            "Mock: Would send location_request notification"
        );

        self.sent.lock().await.push((push_token.to_string(), payload));
        NotificationResult::Sent
    }
}
