//! Location sample domain model.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use shared::geo::Coordinate;
use uuid::Uuid;
use validator::Validate;

use super::trigger_job::JobOutcome;

/// A device location reported for a (user, subject) pair.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationSample {
    pub id: Uuid,
    pub user_id: String,
    pub subject_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub captured_at: DateTime<Utc>,
    pub received_at: DateTime<Utc>,
}

impl LocationSample {
    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }
}

/// Insert payload for a sample.
#[derive(Debug, Clone)]
pub struct NewLocationSample {
    pub user_id: String,
    pub subject_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub captured_at: DateTime<Utc>,
    pub received_at: DateTime<Utc>,
}

/// Closed interval of capture times accepted as timely for a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// `[anchor - lead, anchor + length]`.
    ///
    /// `lead` tolerates device clocks that run slightly behind the server;
    /// with a zero lead nothing captured before `anchor` is accepted.
    pub fn after(anchor: DateTime<Utc>, length: Duration, lead: Duration) -> Self {
        Self {
            start: anchor - lead,
            end: anchor + length,
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at <= self.end
    }
}

/// Request payload for a device location submission.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SubmitLocationRequest {
    #[validate(custom(function = "shared::validation::validate_identifier"))]
    pub user_id: String,

    #[validate(custom(function = "shared::validation::validate_identifier"))]
    pub subject_id: String,

    #[validate(custom(function = "shared::validation::validate_latitude"))]
    pub latitude: f64,

    #[validate(custom(function = "shared::validation::validate_longitude"))]
    pub longitude: f64,

    /// Capture time in milliseconds since epoch; defaults to receive time.
    #[validate(custom(function = "shared::validation::validate_capture_time"))]
    pub capture_time: Option<i64>,
}

/// Response payload for a location submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitLocationResponse {
    pub accepted: bool,
    /// Whether the sample resolved an open job immediately.
    pub evaluated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<JobOutcome>,
}
