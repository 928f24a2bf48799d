//! Trigger job domain model.
//!
//! One job exists per (user, subject, class date). The composite key is the
//! uniqueness constraint that keeps repeated scans and restarts from
//! scheduling a second verification for the same class day.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of a trigger job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerJobStatus {
    Pending,
    Dispatched,
    Resolved,
}

impl TriggerJobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerJobStatus::Pending => "pending",
            TriggerJobStatus::Dispatched => "dispatched",
            TriggerJobStatus::Resolved => "resolved",
        }
    }
}

impl FromStr for TriggerJobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TriggerJobStatus::Pending),
            "dispatched" => Ok(TriggerJobStatus::Dispatched),
            "resolved" => Ok(TriggerJobStatus::Resolved),
            _ => Err(format!("Invalid trigger job status: {}", s)),
        }
    }
}

impl fmt::Display for TriggerJobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a job ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobOutcome {
    Present,
    AbsentNoLocation,
    AbsentOutOfRange,
    /// The day was already in the ledger when evaluation ran.
    AlreadyDecided,
    /// The subject is mis-configured (no class location) or gone.
    CannotEvaluate,
    DispatchFailed,
    /// The class day passed before the job could fire.
    Expired,
}

impl JobOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobOutcome::Present => "present",
            JobOutcome::AbsentNoLocation => "absent_no_location",
            JobOutcome::AbsentOutOfRange => "absent_out_of_range",
            JobOutcome::AlreadyDecided => "already_decided",
            JobOutcome::CannotEvaluate => "cannot_evaluate",
            JobOutcome::DispatchFailed => "dispatch_failed",
            JobOutcome::Expired => "expired",
        }
    }
}

impl FromStr for JobOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "present" => Ok(JobOutcome::Present),
            "absent_no_location" => Ok(JobOutcome::AbsentNoLocation),
            "absent_out_of_range" => Ok(JobOutcome::AbsentOutOfRange),
            "already_decided" => Ok(JobOutcome::AlreadyDecided),
            "cannot_evaluate" => Ok(JobOutcome::CannotEvaluate),
            "dispatch_failed" => Ok(JobOutcome::DispatchFailed),
            "expired" => Ok(JobOutcome::Expired),
            _ => Err(format!("Invalid job outcome: {}", s)),
        }
    }
}

impl fmt::Display for JobOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A scheduled location check for one class day.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerJob {
    pub id: Uuid,
    pub user_id: String,
    pub subject_id: String,
    pub class_date: NaiveDate,
    pub trigger_at: DateTime<Utc>,
    pub status: TriggerJobStatus,
    pub outcome: Option<JobOutcome>,
    pub distance_meters: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub dispatched_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl TriggerJob {
    /// End of the grace window, once the job has been dispatched.
    pub fn grace_deadline(&self, grace: Duration) -> Option<DateTime<Utc>> {
        self.dispatched_at.map(|at| at + grace)
    }

    /// Dispatched and still inside the grace window at `now`.
    pub fn is_awaiting_location(&self, now: DateTime<Utc>, grace: Duration) -> bool {
        self.status == TriggerJobStatus::Dispatched
            && self.grace_deadline(grace).is_some_and(|deadline| now < deadline)
    }
}

/// Insert payload for a new job.
#[derive(Debug, Clone)]
pub struct NewTriggerJob {
    pub user_id: String,
    pub subject_id: String,
    pub class_date: NaiveDate,
    pub trigger_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Terminal state written when a job resolves.
#[derive(Debug, Clone, Copy)]
pub struct JobResolution {
    pub outcome: JobOutcome,
    pub distance_meters: Option<f64>,
    pub resolved_at: DateTime<Utc>,
}

/// One open job in the status response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenJobItem {
    pub job_id: Uuid,
    pub user_id: String,
    pub subject_id: String,
    pub class_date: NaiveDate,
    pub scheduled_at: DateTime<Utc>,
    pub status: TriggerJobStatus,
}

impl From<TriggerJob> for OpenJobItem {
    fn from(job: TriggerJob) -> Self {
        Self {
            job_id: job.id,
            user_id: job.user_id,
            subject_id: job.subject_id,
            class_date: job.class_date,
            scheduled_at: job.trigger_at,
            status: job.status,
        }
    }
}

/// Status query response: jobs not yet resolved.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenJobsResponse {
    pub pending_count: usize,
    pub jobs: Vec<OpenJobItem>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(status: TriggerJobStatus, dispatched_at: Option<DateTime<Utc>>) -> TriggerJob {
        TriggerJob {
            id: Uuid::new_v4(),
            user_id: "u".into(),
            subject_id: "s".into(),
            class_date: NaiveDate::from_ymd_opt(2025, 3, 3).unwrap(),
            trigger_at: Utc::now(),
            status,
            outcome: None,
            distance_meters: None,
            created_at: Utc::now(),
            dispatched_at,
            resolved_at: None,
        }
    }

    #[test]
    fn test_status_round_trip_strings() {
        for status in [
            TriggerJobStatus::Pending,
            TriggerJobStatus::Dispatched,
            TriggerJobStatus::Resolved,
        ] {
            assert_eq!(status.as_str().parse::<TriggerJobStatus>(), Ok(status));
        }
        assert!("done".parse::<TriggerJobStatus>().is_err());
    }

    #[test]
    fn test_outcome_serialization() {
        let json = serde_json::to_string(&JobOutcome::AbsentNoLocation).unwrap();
        assert_eq!(json, "\"absent_no_location\"");
        assert_eq!(
            "dispatch_failed".parse::<JobOutcome>(),
            Ok(JobOutcome::DispatchFailed)
        );
    }

    #[test]
    fn test_awaiting_location_window() {
        let grace = Duration::minutes(5);
        let dispatched = Utc::now();
        let j = job(TriggerJobStatus::Dispatched, Some(dispatched));

        assert!(j.is_awaiting_location(dispatched + Duration::minutes(4), grace));
        assert!(!j.is_awaiting_location(dispatched + Duration::minutes(5), grace));
        assert!(!job(TriggerJobStatus::Pending, None).is_awaiting_location(dispatched, grace));
    }

    #[test]
    fn test_open_job_item_from_job() {
        let j = job(TriggerJobStatus::Pending, None);
        let item = OpenJobItem::from(j.clone());
        assert_eq!(item.job_id, j.id);
        assert_eq!(item.scheduled_at, j.trigger_at);
        let json = serde_json::to_string(&item).unwrap();
        assert!(json.contains("\"status\":\"pending\""));
        assert!(json.contains("\"classDate\":\"2025-03-03\""));
    }
}
