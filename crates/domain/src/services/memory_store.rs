//! In-memory [`AttendanceStore`] for development and tests.
//!
//! Enforces the same uniqueness rules as the PostgreSQL backend. State is
//! lost on restart, so this backend is not meant for production.

use std::collections::{BTreeMap, HashMap};
#[cfg(test)]
use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::store::{AttendanceStore, StoreError};
use crate::models::attendance::{AttendanceEntry, AttendanceRecord, MarkOutcome};
use crate::models::location_sample::{LocationSample, NewLocationSample};
use crate::models::subject::{Subject, SubjectUpsert};
use crate::models::trigger_job::{
    JobResolution, NewTriggerJob, TriggerJob, TriggerJobStatus,
};
use crate::models::user::{User, UserUpsert};

type SubjectKey = (String, String);
type LedgerKey = (String, String, String);
type DayKey = (String, String, String, u32);
type JobKey = (String, String, NaiveDate);

#[derive(Default)]
struct MemoryState {
    users: BTreeMap<String, User>,
    subjects: BTreeMap<SubjectKey, Subject>,
    ledger: HashMap<LedgerKey, AttendanceRecord>,
    entries: HashMap<DayKey, AttendanceEntry>,
    samples: Vec<LocationSample>,
    jobs: HashMap<Uuid, TriggerJob>,
    job_keys: HashMap<JobKey, Uuid>,
    /// (operation, user id) pairs whose reads fail.
    #[cfg(test)]
    failing_reads: HashSet<(&'static str, String)>,
}

impl MemoryState {
    #[cfg(test)]
    fn check_read(&self, operation: &'static str, user_id: &str) -> Result<(), StoreError> {
        if self.failing_reads.contains(&(operation, user_id.to_string())) {
            return Err(StoreError::Backend(format!(
                "simulated {} failure for user {}",
                operation, user_id
            )));
        }
        Ok(())
    }

    #[cfg(not(test))]
    fn check_read(&self, _operation: &'static str, _user_id: &str) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Mutex-guarded in-process store.
#[derive(Default)]
pub struct InMemoryAttendanceStore {
    state: Mutex<MemoryState>,
}

impl InMemoryAttendanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored location samples.
    pub async fn sample_count(&self) -> usize {
        self.state.lock().await.samples.len()
    }

    /// All jobs regardless of status, oldest trigger first.
    pub async fn all_jobs(&self) -> Vec<TriggerJob> {
        let state = self.state.lock().await;
        let mut jobs: Vec<TriggerJob> = state.jobs.values().cloned().collect();
        jobs.sort_by_key(|j| j.trigger_at);
        jobs
    }
}

#[cfg(test)]
impl InMemoryAttendanceStore {
    /// Makes `operation` (`get_user`, `list_subjects`) fail for `user_id`.
    pub(crate) async fn fail_reads_for(&self, operation: &'static str, user_id: &str) {
        self.state
            .lock()
            .await
            .failing_reads
            .insert((operation, user_id.to_string()));
    }

    pub(crate) async fn restore_reads_for(&self, operation: &'static str, user_id: &str) {
        self.state
            .lock()
            .await
            .failing_reads
            .remove(&(operation, user_id.to_string()));
    }
}

fn sorted_by_trigger(mut jobs: Vec<TriggerJob>) -> Vec<TriggerJob> {
    jobs.sort_by_key(|j| (j.trigger_at, j.created_at));
    jobs
}

#[async_trait::async_trait]
impl AttendanceStore for InMemoryAttendanceStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn upsert_user(&self, upsert: UserUpsert) -> Result<User, StoreError> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let user = state
            .users
            .entry(upsert.user_id.clone())
            .and_modify(|u| {
                u.display_name = upsert.display_name.clone().or(u.display_name.take());
                u.push_token = upsert.push_token.clone().or(u.push_token.take());
                u.updated_at = now;
            })
            .or_insert_with(|| User {
                user_id: upsert.user_id.clone(),
                display_name: upsert.display_name.clone(),
                push_token: upsert.push_token.clone(),
                created_at: now,
                updated_at: now,
            });
        Ok(user.clone())
    }

    async fn get_user(&self, user_id: &str) -> Result<Option<User>, StoreError> {
        let state = self.state.lock().await;
        state.check_read("get_user", user_id)?;
        Ok(state.users.get(user_id).cloned())
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        Ok(self.state.lock().await.users.values().cloned().collect())
    }

    async fn upsert_subject(&self, upsert: SubjectUpsert) -> Result<Subject, StoreError> {
        let mut state = self.state.lock().await;
        if !state.users.contains_key(&upsert.user_id) {
            return Err(StoreError::NotFound(format!("user {}", upsert.user_id)));
        }
        let now = Utc::now();
        let key = (upsert.user_id.clone(), upsert.subject_id.clone());
        let created_at = state.subjects.get(&key).map(|s| s.created_at).unwrap_or(now);
        let subject = Subject {
            user_id: upsert.user_id,
            subject_id: upsert.subject_id,
            name: upsert.name,
            schedule: upsert.schedule,
            location: upsert.location,
            auto_verify: upsert.auto_verify,
            created_at,
            updated_at: now,
        };
        state.subjects.insert(key, subject.clone());
        Ok(subject)
    }

    async fn get_subject(
        &self,
        user_id: &str,
        subject_id: &str,
    ) -> Result<Option<Subject>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .subjects
            .get(&(user_id.to_string(), subject_id.to_string()))
            .cloned())
    }

    async fn list_subjects(&self, user_id: &str) -> Result<Vec<Subject>, StoreError> {
        let state = self.state.lock().await;
        state.check_read("list_subjects", user_id)?;
        Ok(state
            .subjects
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn get_attendance(
        &self,
        user_id: &str,
        subject_id: &str,
        month_key: &str,
    ) -> Result<AttendanceRecord, StoreError> {
        let state = self.state.lock().await;
        let key = (
            user_id.to_string(),
            subject_id.to_string(),
            month_key.to_string(),
        );
        Ok(state
            .ledger
            .get(&key)
            .cloned()
            .unwrap_or_else(|| AttendanceRecord::empty(month_key)))
    }

    async fn find_attendance_entry(
        &self,
        user_id: &str,
        subject_id: &str,
        month_key: &str,
        day: u32,
    ) -> Result<Option<AttendanceEntry>, StoreError> {
        let state = self.state.lock().await;
        let key = (
            user_id.to_string(),
            subject_id.to_string(),
            month_key.to_string(),
            day,
        );
        Ok(state.entries.get(&key).cloned())
    }

    async fn mark_attendance(&self, entry: AttendanceEntry) -> Result<MarkOutcome, StoreError> {
        let mut state = self.state.lock().await;
        let key = (
            entry.user_id.clone(),
            entry.subject_id.clone(),
            entry.month_key.clone(),
        );
        let outcome = state
            .ledger
            .entry(key)
            .or_insert_with(|| AttendanceRecord::empty(entry.month_key.clone()))
            .insert(entry.day, entry.decision.mark);
        if outcome == MarkOutcome::Recorded {
            let day_key = (
                entry.user_id.clone(),
                entry.subject_id.clone(),
                entry.month_key.clone(),
                entry.day,
            );
            state.entries.insert(day_key, entry);
        }
        Ok(outcome)
    }

    async fn insert_location_sample(
        &self,
        sample: NewLocationSample,
    ) -> Result<LocationSample, StoreError> {
        let stored = LocationSample {
            id: Uuid::new_v4(),
            user_id: sample.user_id,
            subject_id: sample.subject_id,
            latitude: sample.latitude,
            longitude: sample.longitude,
            captured_at: sample.captured_at,
            received_at: sample.received_at,
        };
        self.state.lock().await.samples.push(stored.clone());
        Ok(stored)
    }

    async fn latest_location_sample(
        &self,
        user_id: &str,
        subject_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Option<LocationSample>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .samples
            .iter()
            .filter(|s| s.user_id == user_id && s.subject_id == subject_id)
            .filter(|s| from <= s.captured_at && s.captured_at <= to)
            .max_by_key(|s| (s.captured_at, s.received_at))
            .cloned())
    }

    async fn purge_location_samples(
        &self,
        captured_before: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let mut state = self.state.lock().await;
        let before = state.samples.len();
        state.samples.retain(|s| s.captured_at >= captured_before);
        Ok((before - state.samples.len()) as u64)
    }

    async fn insert_trigger_job(
        &self,
        job: NewTriggerJob,
    ) -> Result<Option<TriggerJob>, StoreError> {
        let mut state = self.state.lock().await;
        let key = (job.user_id.clone(), job.subject_id.clone(), job.class_date);
        if state.job_keys.contains_key(&key) {
            return Ok(None);
        }
        let stored = TriggerJob {
            id: Uuid::new_v4(),
            user_id: job.user_id,
            subject_id: job.subject_id,
            class_date: job.class_date,
            trigger_at: job.trigger_at,
            status: TriggerJobStatus::Pending,
            outcome: None,
            distance_meters: None,
            created_at: job.created_at,
            dispatched_at: None,
            resolved_at: None,
        };
        state.job_keys.insert(key, stored.id);
        state.jobs.insert(stored.id, stored.clone());
        Ok(Some(stored))
    }

    async fn find_trigger_job(
        &self,
        user_id: &str,
        subject_id: &str,
        class_date: NaiveDate,
    ) -> Result<Option<TriggerJob>, StoreError> {
        let state = self.state.lock().await;
        let key = (user_id.to_string(), subject_id.to_string(), class_date);
        Ok(state
            .job_keys
            .get(&key)
            .and_then(|id| state.jobs.get(id))
            .cloned())
    }

    async fn pending_jobs_due(&self, now: DateTime<Utc>) -> Result<Vec<TriggerJob>, StoreError> {
        let state = self.state.lock().await;
        Ok(sorted_by_trigger(
            state
                .jobs
                .values()
                .filter(|j| j.status == TriggerJobStatus::Pending && j.trigger_at <= now)
                .cloned()
                .collect(),
        ))
    }

    async fn mark_job_dispatched(
        &self,
        job_id: Uuid,
        dispatched_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        match state.jobs.get_mut(&job_id) {
            Some(job) if job.status == TriggerJobStatus::Pending => {
                job.status = TriggerJobStatus::Dispatched;
                job.dispatched_at = Some(dispatched_at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn dispatched_jobs_before(
        &self,
        dispatched_before: DateTime<Utc>,
    ) -> Result<Vec<TriggerJob>, StoreError> {
        let state = self.state.lock().await;
        Ok(sorted_by_trigger(
            state
                .jobs
                .values()
                .filter(|j| j.status == TriggerJobStatus::Dispatched)
                .filter(|j| j.dispatched_at.is_some_and(|at| at <= dispatched_before))
                .cloned()
                .collect(),
        ))
    }

    async fn resolve_trigger_job(
        &self,
        job_id: Uuid,
        resolution: JobResolution,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        match state.jobs.get_mut(&job_id) {
            Some(job) if job.status != TriggerJobStatus::Resolved => {
                job.status = TriggerJobStatus::Resolved;
                job.outcome = Some(resolution.outcome);
                job.distance_meters = resolution.distance_meters;
                job.resolved_at = Some(resolution.resolved_at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn open_trigger_jobs(&self) -> Result<Vec<TriggerJob>, StoreError> {
        let state = self.state.lock().await;
        Ok(sorted_by_trigger(
            state
                .jobs
                .values()
                .filter(|j| j.status != TriggerJobStatus::Resolved)
                .cloned()
                .collect(),
        ))
    }

    async fn purge_resolved_jobs(&self, created_before: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut state = self.state.lock().await;
        let stale: Vec<TriggerJob> = state
            .jobs
            .values()
            .filter(|j| j.status == TriggerJobStatus::Resolved && j.created_at < created_before)
            .cloned()
            .collect();
        for job in &stale {
            state.jobs.remove(&job.id);
            state
                .job_keys
                .remove(&(job.user_id.clone(), job.subject_id.clone(), job.class_date));
        }
        Ok(stale.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::attendance::AttendanceDecision;
    use crate::models::schedule::WeeklySchedule;
    use crate::models::trigger_job::JobOutcome;
    use chrono::Duration;

    fn new_job(class_date: NaiveDate, trigger_at: DateTime<Utc>) -> NewTriggerJob {
        NewTriggerJob {
            user_id: "u1".into(),
            subject_id: "math".into(),
            class_date,
            trigger_at,
            created_at: trigger_at,
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 3).unwrap()
    }

    #[tokio::test]
    async fn test_trigger_job_key_is_unique() {
        let store = InMemoryAttendanceStore::new();
        let now = Utc::now();
        assert!(store.insert_trigger_job(new_job(date(), now)).await.unwrap().is_some());
        assert!(store.insert_trigger_job(new_job(date(), now)).await.unwrap().is_none());
        assert_eq!(store.all_jobs().await.len(), 1);
    }

    #[tokio::test]
    async fn test_dispatch_and_resolve_are_compare_and_set() {
        let store = InMemoryAttendanceStore::new();
        let now = Utc::now();
        let job = store.insert_trigger_job(new_job(date(), now)).await.unwrap().unwrap();

        assert!(store.mark_job_dispatched(job.id, now).await.unwrap());
        assert!(!store.mark_job_dispatched(job.id, now).await.unwrap());

        let resolution = JobResolution {
            outcome: JobOutcome::Present,
            distance_meters: Some(3.0),
            resolved_at: now,
        };
        assert!(store.resolve_trigger_job(job.id, resolution).await.unwrap());
        assert!(!store.resolve_trigger_job(job.id, resolution).await.unwrap());
        assert!(store.open_trigger_jobs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mark_attendance_never_flips() {
        let store = InMemoryAttendanceStore::new();
        let entry = |decision| AttendanceEntry {
            user_id: "u1".into(),
            subject_id: "math".into(),
            month_key: "march 2025".into(),
            day: 3,
            decision,
            decided_at: Utc::now(),
        };

        let first = store
            .mark_attendance(entry(AttendanceDecision::present(4.0)))
            .await
            .unwrap();
        let second = store
            .mark_attendance(entry(AttendanceDecision::absent_no_location()))
            .await
            .unwrap();

        assert_eq!(first, MarkOutcome::Recorded);
        assert_eq!(second, MarkOutcome::AlreadyDecided);
        let record = store.get_attendance("u1", "math", "march 2025").await.unwrap();
        assert!(record.present.contains(&3));
        assert!(record.absent.is_empty());
    }

    #[tokio::test]
    async fn test_latest_sample_respects_window() {
        let store = InMemoryAttendanceStore::new();
        let base = Utc::now();
        for minutes in [0, 3, 10] {
            store
                .insert_location_sample(NewLocationSample {
                    user_id: "u1".into(),
                    subject_id: "math".into(),
                    latitude: minutes as f64,
                    longitude: 0.0,
                    captured_at: base + Duration::minutes(minutes),
                    received_at: base + Duration::minutes(minutes),
                })
                .await
                .unwrap();
        }

        let latest = store
            .latest_location_sample("u1", "math", base, base + Duration::minutes(5))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.latitude, 3.0);

        let none = store
            .latest_location_sample("u1", "other", base, base + Duration::minutes(5))
            .await
            .unwrap();
        assert!(none.is_none());
    }

    #[tokio::test]
    async fn test_subject_requires_user() {
        let store = InMemoryAttendanceStore::new();
        let result = store
            .upsert_subject(SubjectUpsert {
                user_id: "ghost".into(),
                subject_id: "math".into(),
                name: "Math".into(),
                schedule: WeeklySchedule::new(),
                location: None,
                auto_verify: None,
            })
            .await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_purge_only_removes_old_resolved_jobs() {
        let store = InMemoryAttendanceStore::new();
        let now = Utc::now();
        let old = store
            .insert_trigger_job(new_job(date(), now - Duration::days(3)))
            .await
            .unwrap()
            .unwrap();
        let open = store
            .insert_trigger_job(new_job(
                date().succ_opt().unwrap(),
                now - Duration::days(3),
            ))
            .await
            .unwrap()
            .unwrap();
        store
            .resolve_trigger_job(
                old.id,
                JobResolution {
                    outcome: JobOutcome::Expired,
                    distance_meters: None,
                    resolved_at: now,
                },
            )
            .await
            .unwrap();

        let purged = store
            .purge_resolved_jobs(now - Duration::days(2))
            .await
            .unwrap();
        assert_eq!(purged, 1);
        let remaining = store.all_jobs().await;
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, open.id);
    }
}
