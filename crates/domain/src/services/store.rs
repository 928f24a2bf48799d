//! Storage abstraction for the attendance engine.
//!
//! The engine only talks to this trait. Backends (PostgreSQL in the
//! `persistence` crate, [`super::memory_store::InMemoryAttendanceStore`] for
//! tests and local runs) must enforce two constraints themselves:
//! - one ledger mark per (user, subject, month, day)
//! - one trigger job per (user, subject, class date)

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::models::attendance::{AttendanceEntry, AttendanceRecord, MarkOutcome};
use crate::models::location_sample::{LocationSample, NewLocationSample};
use crate::models::subject::{Subject, SubjectUpsert};
use crate::models::trigger_job::{JobResolution, NewTriggerJob, TriggerJob};
use crate::models::user::{User, UserUpsert};

/// Errors surfaced by storage backends.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Referenced record not found: {0}")]
    NotFound(String),

    #[error("Stored value is corrupt: {0}")]
    Corrupt(String),
}

/// Persistence operations needed by the scheduler, queue, evaluator and ingest.
#[async_trait::async_trait]
pub trait AttendanceStore: Send + Sync {
    /// Cheap connectivity check for health probes.
    async fn ping(&self) -> Result<(), StoreError>;

    async fn upsert_user(&self, user: UserUpsert) -> Result<User, StoreError>;

    async fn get_user(&self, user_id: &str) -> Result<Option<User>, StoreError>;

    async fn list_users(&self) -> Result<Vec<User>, StoreError>;

    /// Fails with [`StoreError::NotFound`] if the owning user does not exist.
    async fn upsert_subject(&self, subject: SubjectUpsert) -> Result<Subject, StoreError>;

    async fn get_subject(
        &self,
        user_id: &str,
        subject_id: &str,
    ) -> Result<Option<Subject>, StoreError>;

    async fn list_subjects(&self, user_id: &str) -> Result<Vec<Subject>, StoreError>;

    /// Returns an empty record when nothing has been marked for the month.
    async fn get_attendance(
        &self,
        user_id: &str,
        subject_id: &str,
        month_key: &str,
    ) -> Result<AttendanceRecord, StoreError>;

    /// The stored decision for one day, if any.
    async fn find_attendance_entry(
        &self,
        user_id: &str,
        subject_id: &str,
        month_key: &str,
        day: u32,
    ) -> Result<Option<AttendanceEntry>, StoreError>;

    /// Idempotent set-union write. A day that is already present in either
    /// set is left untouched and reported as [`MarkOutcome::AlreadyDecided`].
    async fn mark_attendance(&self, entry: AttendanceEntry) -> Result<MarkOutcome, StoreError>;

    async fn insert_location_sample(
        &self,
        sample: NewLocationSample,
    ) -> Result<LocationSample, StoreError>;

    /// Most recently captured sample with `from <= captured_at <= to`.
    async fn latest_location_sample(
        &self,
        user_id: &str,
        subject_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Option<LocationSample>, StoreError>;

    async fn purge_location_samples(
        &self,
        captured_before: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    /// Inserts a pending job. Returns `None` when a job already exists for the
    /// same (user, subject, class date).
    async fn insert_trigger_job(&self, job: NewTriggerJob)
        -> Result<Option<TriggerJob>, StoreError>;

    async fn find_trigger_job(
        &self,
        user_id: &str,
        subject_id: &str,
        class_date: NaiveDate,
    ) -> Result<Option<TriggerJob>, StoreError>;

    /// Pending jobs with `trigger_at <= now`, oldest first.
    async fn pending_jobs_due(&self, now: DateTime<Utc>) -> Result<Vec<TriggerJob>, StoreError>;

    /// Compare-and-set Pending -> Dispatched. `false` if the job was not pending.
    async fn mark_job_dispatched(
        &self,
        job_id: Uuid,
        dispatched_at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Dispatched jobs with `dispatched_at <= dispatched_before`.
    async fn dispatched_jobs_before(
        &self,
        dispatched_before: DateTime<Utc>,
    ) -> Result<Vec<TriggerJob>, StoreError>;

    /// Moves a job to Resolved exactly once. `false` if it was already resolved.
    async fn resolve_trigger_job(
        &self,
        job_id: Uuid,
        resolution: JobResolution,
    ) -> Result<bool, StoreError>;

    /// Jobs that are Pending or Dispatched, ordered by trigger time.
    async fn open_trigger_jobs(&self) -> Result<Vec<TriggerJob>, StoreError>;

    /// Deletes resolved jobs created before `created_before`.
    async fn purge_resolved_jobs(&self, created_before: DateTime<Utc>) -> Result<u64, StoreError>;
}
