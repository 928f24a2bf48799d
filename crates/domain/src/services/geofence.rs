//! Geofence evaluation: the authoritative present/absent decision.

use std::sync::Arc;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use shared::geo::{haversine_distance_meters, within_radius};

use super::store::{AttendanceStore, StoreError};
use crate::models::attendance::{
    month_key, AttendanceDecision, AttendanceEntry, DecisionReason, MarkOutcome,
};
use crate::models::location_sample::{LocationSample, TimeWindow};
use crate::models::subject::ClassLocation;
use crate::models::trigger_job::{JobOutcome, JobResolution, TriggerJob};

/// What an evaluation did.
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    /// The day was already in the ledger; nothing was written.
    AlreadyDecided,
    /// The subject cannot be checked (no class location, or it is gone).
    CannotEvaluate(String),
    /// A new decision was committed.
    Decided(AttendanceDecision),
}

impl Evaluation {
    pub fn job_outcome(&self) -> JobOutcome {
        match self {
            Evaluation::AlreadyDecided => JobOutcome::AlreadyDecided,
            Evaluation::CannotEvaluate(_) => JobOutcome::CannotEvaluate,
            Evaluation::Decided(decision) => match decision.reason {
                DecisionReason::WithinRadius => JobOutcome::Present,
                DecisionReason::NoTimelyLocation => JobOutcome::AbsentNoLocation,
                DecisionReason::OutOfRange => JobOutcome::AbsentOutOfRange,
            },
        }
    }

    pub fn distance_meters(&self) -> Option<f64> {
        match self {
            Evaluation::Decided(decision) => decision.distance_meters,
            _ => None,
        }
    }
}

/// Decides a class day from the freshest timely sample.
pub fn decide(location: &ClassLocation, sample: Option<&LocationSample>) -> AttendanceDecision {
    let Some(sample) = sample else {
        return AttendanceDecision::absent_no_location();
    };
    let distance = haversine_distance_meters(sample.coordinate(), location.coordinate());
    if within_radius(distance, location.radius_meters) {
        AttendanceDecision::present(distance)
    } else {
        AttendanceDecision::absent_out_of_range(distance)
    }
}

/// Reads the subject and ledger, picks the sample, and commits the decision.
#[derive(Clone)]
pub struct GeofenceEvaluator {
    store: Arc<dyn AttendanceStore>,
}

impl GeofenceEvaluator {
    pub fn new(store: Arc<dyn AttendanceStore>) -> Self {
        Self { store }
    }

    /// Evaluates one (user, subject, class date) using samples captured in `window`.
    ///
    /// Safe to call repeatedly: once a day is decided every later call reports
    /// [`Evaluation::AlreadyDecided`] without writing.
    pub async fn evaluate(
        &self,
        user_id: &str,
        subject_id: &str,
        class_date: NaiveDate,
        window: TimeWindow,
        now: DateTime<Utc>,
    ) -> Result<Evaluation, StoreError> {
        let month = month_key(class_date);
        let day = class_date.day();

        let record = self.store.get_attendance(user_id, subject_id, &month).await?;
        if record.is_decided(day) {
            tracing::debug!(user_id, subject_id, %month, day, "Attendance already decided");
            return Ok(Evaluation::AlreadyDecided);
        }

        let Some(subject) = self.store.get_subject(user_id, subject_id).await? else {
            return Ok(Evaluation::CannotEvaluate("subject not found".to_string()));
        };
        let Some(location) = subject.location else {
            tracing::warn!(user_id, subject_id, "Subject has no class location; cannot evaluate");
            return Ok(Evaluation::CannotEvaluate("class location not set".to_string()));
        };

        let sample = self
            .store
            .latest_location_sample(user_id, subject_id, window.start, window.end)
            .await?;
        let decision = decide(&location, sample.as_ref());

        let entry = AttendanceEntry {
            user_id: user_id.to_string(),
            subject_id: subject_id.to_string(),
            month_key: month.clone(),
            day,
            decision,
            decided_at: now,
        };
        match self.store.mark_attendance(entry).await? {
            MarkOutcome::Recorded => {
                tracing::info!(
                    user_id,
                    subject_id,
                    %month,
                    day,
                    mark = %decision.mark,
                    reason = %decision.reason,
                    distance_meters = ?decision.distance_meters,
                    "Attendance decided"
                );
                Ok(Evaluation::Decided(decision))
            }
            MarkOutcome::AlreadyDecided => Ok(Evaluation::AlreadyDecided),
        }
    }

    /// Resolution to record on `job` after `evaluation`.
    ///
    /// When the day was already decided, the stored mark is read back. A mark
    /// written after the job was dispatched belongs to this job (the ingest
    /// fast path and the queue can both evaluate it), so the job reports that
    /// decision rather than `already_decided`.
    pub async fn resolution_for(
        &self,
        job: &TriggerJob,
        evaluation: &Evaluation,
        now: DateTime<Utc>,
    ) -> Result<JobResolution, StoreError> {
        let mut resolution = JobResolution {
            outcome: evaluation.job_outcome(),
            distance_meters: evaluation.distance_meters(),
            resolved_at: now,
        };
        let (Evaluation::AlreadyDecided, Some(dispatched_at)) = (evaluation, job.dispatched_at)
        else {
            return Ok(resolution);
        };

        let stored = self
            .store
            .find_attendance_entry(
                &job.user_id,
                &job.subject_id,
                &month_key(job.class_date),
                job.class_date.day(),
            )
            .await?;
        if let Some(entry) = stored.filter(|e| e.decided_at >= dispatched_at) {
            let decided = Evaluation::Decided(entry.decision);
            resolution.outcome = decided.job_outcome();
            resolution.distance_meters = decided.distance_meters();
        }
        Ok(resolution)
    }
}
