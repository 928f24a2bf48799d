//! Trigger scheduler: the periodic scan that turns today's classes into jobs.
//!
//! One scan reads every user and subject, finds the class still running or
//! ahead today, and registers a single pending job per (user, subject, date).
//! The job key lives in storage, so repeated scans and restarts converge on
//! the same job instead of creating another one.

use std::sync::Arc;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::Serialize;
use tokio::sync::Mutex;

use super::settings::{EngineSettings, LocalNow};
use super::store::{AttendanceStore, StoreError};
use crate::models::attendance::month_key;
use crate::models::schedule::ClassInterval;
use crate::models::subject::Subject;
use crate::models::trigger_job::{NewTriggerJob, TriggerJob};

/// Summary of one scan pass.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanReport {
    pub local_date: Option<NaiveDate>,
    pub day_name: String,
    pub users_scanned: usize,
    pub subjects_scanned: usize,
    pub jobs_created: usize,
    /// Day already in the ledger or a job already exists for it.
    pub already_handled: usize,
    /// No class left today for the subject.
    pub no_class: usize,
    /// Missing push token, missing class location, or auto-verify off.
    pub skipped_config: usize,
    /// Units skipped because a read or write failed.
    pub failed_units: usize,
}

/// What happened to one subject during a scan.
#[derive(Debug)]
enum SubjectScan {
    Created(TriggerJob),
    AlreadyDecided,
    JobExists,
    NoClassRemaining,
}

/// Periodic schedule scanner.
#[derive(Clone)]
pub struct TriggerScheduler {
    store: Arc<dyn AttendanceStore>,
    settings: EngineSettings,
    scan_lock: Arc<Mutex<()>>,
}

impl TriggerScheduler {
    pub fn new(store: Arc<dyn AttendanceStore>, settings: EngineSettings) -> Self {
        Self {
            store,
            settings,
            scan_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Runs one full scan at `now`.
    ///
    /// Scans never overlap; a call made while another scan is running waits
    /// for it to finish. Only a failure to enumerate users fails the pass.
    pub async fn scan(&self, now: DateTime<Utc>) -> Result<ScanReport, StoreError> {
        let _guard = self.scan_lock.lock().await;
        let local = self.settings.local_now(now);
        let mut report = ScanReport {
            local_date: Some(local.date),
            day_name: local.day_name.to_string(),
            ..Default::default()
        };

        let users = self.store.list_users().await?;
        for user in users {
            report.users_scanned += 1;
            if user.push_address().is_none() {
                tracing::warn!(user_id = %user.user_id, "User has no push token; skipping");
                report.skipped_config += 1;
                continue;
            }

            let subjects = match self.store.list_subjects(&user.user_id).await {
                Ok(subjects) => subjects,
                Err(e) => {
                    tracing::warn!(
                        user_id = %user.user_id,
                        error = %e,
                        "Failed to read subjects; skipping user this cycle"
                    );
                    report.failed_units += 1;
                    continue;
                }
            };

            for subject in subjects {
                report.subjects_scanned += 1;
                if !subject.is_auto_verified() {
                    report.skipped_config += 1;
                    continue;
                }
                if subject.location.is_none() {
                    tracing::warn!(
                        user_id = %subject.user_id,
                        subject_id = %subject.subject_id,
                        "Subject has no class location; skipping"
                    );
                    report.skipped_config += 1;
                    continue;
                }

                match self.scan_subject(&subject, &local).await {
                    Ok(SubjectScan::Created(job)) => {
                        tracing::info!(
                            job_id = %job.id,
                            user_id = %job.user_id,
                            subject_id = %job.subject_id,
                            trigger_at = %job.trigger_at,
                            "Trigger job scheduled"
                        );
                        report.jobs_created += 1;
                    }
                    Ok(SubjectScan::AlreadyDecided) | Ok(SubjectScan::JobExists) => {
                        report.already_handled += 1;
                    }
                    Ok(SubjectScan::NoClassRemaining) => report.no_class += 1,
                    Err(e) => {
                        tracing::warn!(
                            user_id = %subject.user_id,
                            subject_id = %subject.subject_id,
                            error = %e,
                            "Failed to scan subject; skipping this cycle"
                        );
                        report.failed_units += 1;
                    }
                }
            }
        }

        tracing::debug!(
            users = report.users_scanned,
            subjects = report.subjects_scanned,
            jobs_created = report.jobs_created,
            "Trigger scan finished"
        );
        Ok(report)
    }

    /// Reads schedule, then ledger, then job key, in that order, for one subject.
    async fn scan_subject(
        &self,
        subject: &Subject,
        local: &LocalNow,
    ) -> Result<SubjectScan, StoreError> {
        let Some(interval) = next_open_interval(subject, local) else {
            return Ok(SubjectScan::NoClassRemaining);
        };

        let record = self
            .store
            .get_attendance(&subject.user_id, &subject.subject_id, &month_key(local.date))
            .await?;
        if record.is_decided(local.date.day()) {
            return Ok(SubjectScan::AlreadyDecided);
        }

        if self
            .store
            .find_trigger_job(&subject.user_id, &subject.subject_id, local.date)
            .await?
            .is_some()
        {
            return Ok(SubjectScan::JobExists);
        }

        let trigger_at = self.trigger_instant(&interval, local);
        let created = self
            .store
            .insert_trigger_job(NewTriggerJob {
                user_id: subject.user_id.clone(),
                subject_id: subject.subject_id.clone(),
                class_date: local.date,
                trigger_at,
                created_at: local.instant,
            })
            .await?;

        // A concurrent scan can win the insert between the lookup and here.
        Ok(created.map_or(SubjectScan::JobExists, SubjectScan::Created))
    }

    /// Today's instant for the policy minute, or `now` if that minute has passed.
    fn trigger_instant(&self, interval: &ClassInterval, local: &LocalNow) -> DateTime<Utc> {
        let minute = self.settings.trigger_policy.trigger_minute(interval);
        if minute <= local.minute_of_day {
            return local.instant;
        }
        local.instant_at_minute(minute).unwrap_or(local.instant)
    }
}

/// First class of the day that has not ended yet.
fn next_open_interval(subject: &Subject, local: &LocalNow) -> Option<ClassInterval> {
    subject
        .schedule
        .intervals_for_day(local.day_name)
        .into_iter()
        .find(|interval| !interval.has_ended(local.minute_of_day))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::attendance::{AttendanceDecision, AttendanceEntry};
    use crate::models::schedule::{DayEntry, RawInterval, WeeklySchedule};
    use crate::models::subject::{ClassLocation, SubjectUpsert};
    use crate::models::trigger_job::TriggerJobStatus;
    use crate::models::user::UserUpsert;
    use crate::services::memory_store::InMemoryAttendanceStore;
    use crate::services::trigger_policy::TriggerPolicy;
    use chrono::TimeZone;

    // 2025-03-03 is a Monday.
    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 3, hour, minute, 0).unwrap()
    }

    fn monday_nine_to_ten() -> WeeklySchedule {
        WeeklySchedule::new().with_day("Monday", DayEntry::Single(RawInterval::new("09:00", "10:00")))
    }

    async fn seed_user(store: &InMemoryAttendanceStore, user_id: &str, token: Option<&str>) {
        store
            .upsert_user(UserUpsert {
                user_id: user_id.into(),
                display_name: None,
                push_token: token.map(str::to_string),
            })
            .await
            .unwrap();
    }

    async fn seed_subject(
        store: &InMemoryAttendanceStore,
        user_id: &str,
        subject_id: &str,
        schedule: WeeklySchedule,
        auto_verify: Option<bool>,
    ) {
        store
            .upsert_subject(SubjectUpsert {
                user_id: user_id.into(),
                subject_id: subject_id.into(),
                name: subject_id.into(),
                schedule,
                location: Some(ClassLocation {
                    latitude: 0.0,
                    longitude: 0.0,
                    radius_meters: 50.0,
                }),
                auto_verify,
            })
            .await
            .unwrap();
    }

    async fn setup() -> (Arc<InMemoryAttendanceStore>, TriggerScheduler) {
        let store = Arc::new(InMemoryAttendanceStore::new());
        seed_user(&store, "u1", Some("token-1")).await;
        seed_subject(&store, "u1", "math", monday_nine_to_ten(), None).await;
        let scheduler = TriggerScheduler::new(store.clone(), EngineSettings::default());
        (store, scheduler)
    }

    #[tokio::test]
    async fn test_scan_schedules_midpoint() {
        let (store, scheduler) = setup().await;

        let report = scheduler.scan(at(8, 0)).await.unwrap();

        assert_eq!(report.jobs_created, 1);
        assert_eq!(report.day_name, "monday");
        let jobs = store.all_jobs().await;
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].trigger_at, at(9, 30));
        assert_eq!(jobs[0].status, TriggerJobStatus::Pending);
    }

    #[tokio::test]
    async fn test_scan_twice_creates_one_job() {
        let (store, scheduler) = setup().await;

        scheduler.scan(at(8, 0)).await.unwrap();
        let second = scheduler.scan(at(8, 0)).await.unwrap();

        assert_eq!(second.jobs_created, 0);
        assert_eq!(second.already_handled, 1);
        assert_eq!(store.all_jobs().await.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_scans_create_one_job() {
        let (store, scheduler) = setup().await;
        let other = scheduler.clone();

        let (a, b) = tokio::join!(scheduler.scan(at(8, 0)), other.scan(at(8, 0)));

        assert_eq!(a.unwrap().jobs_created + b.unwrap().jobs_created, 1);
        assert_eq!(store.all_jobs().await.len(), 1);
    }

    #[tokio::test]
    async fn test_past_midpoint_fires_immediately() {
        let (store, scheduler) = setup().await;

        scheduler.scan(at(9, 45)).await.unwrap();

        let jobs = store.all_jobs().await;
        assert_eq!(jobs[0].trigger_at, at(9, 45));
    }

    #[tokio::test]
    async fn test_ended_class_is_not_scheduled() {
        let (store, scheduler) = setup().await;

        let report = scheduler.scan(at(10, 0)).await.unwrap();

        assert_eq!(report.no_class, 1);
        assert!(store.all_jobs().await.is_empty());
    }

    #[tokio::test]
    async fn test_end_of_class_policy() {
        let (store, _) = setup().await;
        let scheduler = TriggerScheduler::new(
            store.clone(),
            EngineSettings {
                trigger_policy: TriggerPolicy::EndOfClass,
                ..Default::default()
            },
        );

        scheduler.scan(at(8, 0)).await.unwrap();

        assert_eq!(store.all_jobs().await[0].trigger_at, at(10, 0));
    }

    #[tokio::test]
    async fn test_decided_day_is_skipped() {
        let (store, scheduler) = setup().await;
        store
            .mark_attendance(AttendanceEntry {
                user_id: "u1".into(),
                subject_id: "math".into(),
                month_key: "march 2025".into(),
                day: 3,
                decision: AttendanceDecision::present(1.0),
                decided_at: at(7, 0),
            })
            .await
            .unwrap();

        let report = scheduler.scan(at(8, 0)).await.unwrap();

        assert_eq!(report.already_handled, 1);
        assert!(store.all_jobs().await.is_empty());
    }

    #[tokio::test]
    async fn test_configuration_errors_are_skipped() {
        let (store, scheduler) = setup().await;
        seed_user(&store, "no-token", None).await;
        seed_subject(&store, "no-token", "math", monday_nine_to_ten(), None).await;
        seed_subject(&store, "u1", "opted-out", monday_nine_to_ten(), Some(false)).await;
        store
            .upsert_subject(SubjectUpsert {
                user_id: "u1".into(),
                subject_id: "nowhere".into(),
                name: "Nowhere".into(),
                schedule: monday_nine_to_ten(),
                location: None,
                auto_verify: Some(true),
            })
            .await
            .unwrap();

        let report = scheduler.scan(at(8, 0)).await.unwrap();

        assert_eq!(report.jobs_created, 1);
        assert_eq!(report.skipped_config, 3);
        let jobs = store.all_jobs().await;
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].subject_id, "math");
    }

    #[tokio::test]
    async fn test_read_failure_for_one_user_does_not_abort_scan() {
        let (store, scheduler) = setup().await;
        seed_user(&store, "broken", Some("token-2")).await;
        seed_subject(&store, "broken", "math", monday_nine_to_ten(), None).await;
        store.fail_reads_for("list_subjects", "broken").await;

        let report = scheduler.scan(at(8, 0)).await.unwrap();

        assert_eq!(report.failed_units, 1);
        assert_eq!(report.jobs_created, 1);
        assert_eq!(store.all_jobs().await[0].user_id, "u1");
    }

    #[tokio::test]
    async fn test_only_first_open_class_of_day_gets_job() {
        let store = Arc::new(InMemoryAttendanceStore::new());
        seed_user(&store, "u1", Some("token-1")).await;
        let schedule: WeeklySchedule = serde_json::from_value(serde_json::json!({
            "monday": [
                {"start": "13:00", "end": "14:00"},
                {"start": "08:00", "end": "09:00"}
            ]
        }))
        .unwrap();
        seed_subject(&store, "u1", "lab", schedule, Some(true)).await;
        let scheduler = TriggerScheduler::new(store.clone(), EngineSettings::default());

        scheduler.scan(at(9, 15)).await.unwrap();
        scheduler.scan(at(13, 5)).await.unwrap();

        let jobs = store.all_jobs().await;
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].trigger_at, at(13, 30));
    }
}
