//! Job queue: fires due trigger jobs and resolves them after the grace window.
//!
//! The queue holds no in-process timers. Each pass reads persisted jobs and
//! compares them with `now`, so a restart picks up exactly where the last
//! pass left off. Every state change is a compare-and-set in storage; a pass
//! that loses a race simply moves on.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinSet;

use super::geofence::GeofenceEvaluator;
use super::notification::{LocationRequestPayload, NotificationResult, NotificationService};
use super::settings::EngineSettings;
use super::store::{AttendanceStore, StoreError};
use crate::models::trigger_job::{JobOutcome, JobResolution, TriggerJob};

/// Summary of one queue pass.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueReport {
    /// Pending jobs whose class day passed before they could fire.
    pub expired: usize,
    pub dispatched: usize,
    pub dispatch_failed: usize,
    /// Jobs resolved after their grace window.
    pub evaluated: usize,
    pub present: usize,
    pub absent: usize,
    /// Jobs left for the next pass after a storage error.
    pub errors: usize,
}

/// Summary of one purge pass.
#[derive(Debug, Clone, Copy, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurgeReport {
    pub jobs_purged: u64,
    pub samples_purged: u64,
}

#[derive(Clone)]
pub struct JobQueue {
    store: Arc<dyn AttendanceStore>,
    notifier: Arc<dyn NotificationService>,
    evaluator: GeofenceEvaluator,
    settings: EngineSettings,
}

impl JobQueue {
    pub fn new(
        store: Arc<dyn AttendanceStore>,
        notifier: Arc<dyn NotificationService>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            evaluator: GeofenceEvaluator::new(store.clone()),
            store,
            notifier,
            settings,
        }
    }

    /// Runs one pass: expire stale jobs, dispatch due jobs, resolve jobs whose
    /// grace window has closed.
    pub async fn process(&self, now: DateTime<Utc>) -> Result<QueueReport, StoreError> {
        let mut report = QueueReport::default();
        let today = self.settings.local_now(now).date;

        let due = self.store.pending_jobs_due(now).await?;
        let mut to_dispatch = Vec::with_capacity(due.len());
        for job in due {
            if job.class_date < today {
                let resolution = JobResolution {
                    outcome: JobOutcome::Expired,
                    distance_meters: None,
                    resolved_at: now,
                };
                match self.store.resolve_trigger_job(job.id, resolution).await {
                    Ok(true) => {
                        tracing::info!(
                            job_id = %job.id,
                            class_date = %job.class_date,
                            "Trigger job expired"
                        );
                        report.expired += 1;
                    }
                    Ok(false) => {}
                    Err(e) => {
                        tracing::warn!(job_id = %job.id, error = %e, "Failed to expire job");
                        report.errors += 1;
                    }
                }
                continue;
            }
            to_dispatch.push(job);
        }

        self.dispatch_all(to_dispatch, now, &mut report).await;

        let cutoff = now - self.settings.grace_window;
        let closed = self.store.dispatched_jobs_before(cutoff).await?;
        for job in closed {
            match self.resolve_after_grace(&job, now).await {
                Ok(Some(outcome)) => {
                    report.evaluated += 1;
                    match outcome {
                        JobOutcome::Present => report.present += 1,
                        JobOutcome::AbsentNoLocation | JobOutcome::AbsentOutOfRange => {
                            report.absent += 1
                        }
                        _ => {}
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(job_id = %job.id, error = %e, "Failed to evaluate job; will retry");
                    report.errors += 1;
                }
            }
        }

        Ok(report)
    }

    /// Claims each job and sends the location requests concurrently.
    async fn dispatch_all(
        &self,
        jobs: Vec<TriggerJob>,
        now: DateTime<Utc>,
        report: &mut QueueReport,
    ) {
        let mut tasks = JoinSet::new();
        for job in jobs {
            // A failed read leaves the job pending for the next pass.
            let push_token = match self.store.get_user(&job.user_id).await {
                Ok(user) => user.and_then(|u| u.push_address().map(str::to_string)),
                Err(e) => {
                    tracing::warn!(
                        job_id = %job.id,
                        user_id = %job.user_id,
                        error = %e,
                        "Failed to read user; job stays pending"
                    );
                    report.errors += 1;
                    continue;
                }
            };

            match self.store.mark_job_dispatched(job.id, now).await {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    tracing::warn!(job_id = %job.id, error = %e, "Failed to claim job");
                    report.errors += 1;
                    continue;
                }
            }

            let notifier = self.notifier.clone();
            tasks.spawn(async move {
                let result =
                    send_request(notifier.as_ref(), &job, push_token.as_deref(), now).await;
                (job.id, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let (job_id, result) = match joined {
                Ok(pair) => pair,
                Err(e) => {
                    tracing::error!(error = %e, "Dispatch task panicked");
                    report.errors += 1;
                    continue;
                }
            };

            if result == NotificationResult::Sent {
                report.dispatched += 1;
                continue;
            }

            tracing::warn!(%job_id, result = ?result, "Location request not delivered");
            report.dispatch_failed += 1;
            let resolution = JobResolution {
                outcome: JobOutcome::DispatchFailed,
                distance_meters: None,
                resolved_at: now,
            };
            if let Err(e) = self.store.resolve_trigger_job(job_id, resolution).await {
                tracing::warn!(%job_id, error = %e, "Failed to resolve undelivered job");
                report.errors += 1;
            }
        }
    }

    /// Evaluates a dispatched job with the freshest timely sample and resolves it.
    ///
    /// Returns `None` when another path resolved the job first.
    async fn resolve_after_grace(
        &self,
        job: &TriggerJob,
        now: DateTime<Utc>,
    ) -> Result<Option<JobOutcome>, StoreError> {
        let Some(dispatched_at) = job.dispatched_at else {
            return Ok(None);
        };
        let window = self.settings.timeliness_window(dispatched_at);
        let evaluation = self
            .evaluator
            .evaluate(&job.user_id, &job.subject_id, job.class_date, window, now)
            .await?;

        let resolution = self.evaluator.resolution_for(job, &evaluation, now).await?;
        let resolved = self.store.resolve_trigger_job(job.id, resolution).await?;
        if resolved {
            tracing::info!(
                job_id = %job.id,
                user_id = %job.user_id,
                subject_id = %job.subject_id,
                outcome = %resolution.outcome,
                "Trigger job resolved"
            );
        }
        Ok(resolved.then_some(resolution.outcome))
    }

    /// Deletes old resolved jobs and old location samples.
    pub async fn purge(&self, now: DateTime<Utc>) -> Result<PurgeReport, StoreError> {
        let jobs_purged = self
            .store
            .purge_resolved_jobs(now - self.settings.job_retention)
            .await?;
        let samples_purged = self
            .store
            .purge_location_samples(now - self.settings.sample_retention)
            .await?;
        Ok(PurgeReport {
            jobs_purged,
            samples_purged,
        })
    }
}

async fn send_request(
    notifier: &dyn NotificationService,
    job: &TriggerJob,
    push_token: Option<&str>,
    now: DateTime<Utc>,
) -> NotificationResult {
    let Some(token) = push_token else {
        return NotificationResult::NoToken;
    };
    // The job id doubles as the correlation id the device echoes back.
    let payload = LocationRequestPayload::new(&job.user_id, &job.subject_id, job.id, now);
    notifier.send_location_request(token, payload).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::attendance::{AttendanceDecision, AttendanceEntry, AttendanceMark};
    use crate::models::location_sample::NewLocationSample;
    use crate::models::schedule::{DayEntry, RawInterval, WeeklySchedule};
    use crate::models::subject::{ClassLocation, SubjectUpsert};
    use crate::models::trigger_job::{NewTriggerJob, TriggerJobStatus};
    use crate::models::user::UserUpsert;
    use crate::services::memory_store::InMemoryAttendanceStore;
    use crate::services::notification::MockNotificationService;
    use chrono::{Duration, NaiveDate, TimeZone};

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 3, hour, minute, 0).unwrap()
    }

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 3).unwrap()
    }

    async fn seed(store: &InMemoryAttendanceStore, user_id: &str, token: &str) {
        store
            .upsert_user(UserUpsert {
                user_id: user_id.into(),
                display_name: None,
                push_token: Some(token.into()),
            })
            .await
            .unwrap();
        store
            .upsert_subject(SubjectUpsert {
                user_id: user_id.into(),
                subject_id: "math".into(),
                name: "Math".into(),
                schedule: WeeklySchedule::new()
                    .with_day("monday", DayEntry::Single(RawInterval::new("09:00", "10:00"))),
                location: Some(ClassLocation {
                    latitude: 0.0,
                    longitude: 0.0,
                    radius_meters: 50.0,
                }),
                auto_verify: None,
            })
            .await
            .unwrap();
    }

    async fn pending_job(
        store: &InMemoryAttendanceStore,
        user_id: &str,
        class_date: NaiveDate,
        trigger_at: DateTime<Utc>,
    ) -> TriggerJob {
        store
            .insert_trigger_job(NewTriggerJob {
                user_id: user_id.into(),
                subject_id: "math".into(),
                class_date,
                trigger_at,
                created_at: trigger_at - Duration::hours(1),
            })
            .await
            .unwrap()
            .unwrap()
    }

    fn build_queue(
        store: Arc<InMemoryAttendanceStore>,
        notifier: MockNotificationService,
    ) -> JobQueue {
        JobQueue::new(store, Arc::new(notifier), EngineSettings::default())
    }

    #[tokio::test]
    async fn test_future_job_is_held() {
        let store = Arc::new(InMemoryAttendanceStore::new());
        seed(&store, "u1", "tok").await;
        pending_job(&store, "u1", monday(), at(9, 30)).await;
        let notifier = MockNotificationService::new();
        let queue = build_queue(store.clone(), notifier.clone());

        let report = queue.process(at(9, 29)).await.unwrap();

        assert_eq!(report.dispatched, 0);
        assert!(notifier.sent().await.is_empty());
        assert_eq!(store.all_jobs().await[0].status, TriggerJobStatus::Pending);
    }

    #[tokio::test]
    async fn test_due_job_dispatches_once() {
        let store = Arc::new(InMemoryAttendanceStore::new());
        seed(&store, "u1", "tok").await;
        let job = pending_job(&store, "u1", monday(), at(9, 30)).await;
        let notifier = MockNotificationService::new();
        let queue = build_queue(store.clone(), notifier.clone());

        let first = queue.process(at(9, 30)).await.unwrap();
        let second = queue.process(at(9, 31)).await.unwrap();

        assert_eq!(first.dispatched, 1);
        assert_eq!(second.dispatched, 0);
        let sent = notifier.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "tok");
        assert_eq!(sent[0].1.correlation_id, job.id);
        assert_eq!(store.all_jobs().await[0].status, TriggerJobStatus::Dispatched);
    }

    #[tokio::test]
    async fn test_no_show_resolves_absent_once() {
        let store = Arc::new(InMemoryAttendanceStore::new());
        seed(&store, "u1", "tok").await;
        pending_job(&store, "u1", monday(), at(9, 30)).await;
        let queue = build_queue(store.clone(), MockNotificationService::new());

        queue.process(at(9, 30)).await.unwrap();
        let during_grace = queue.process(at(9, 34)).await.unwrap();
        let after_grace = queue.process(at(9, 35)).await.unwrap();
        let later = queue.process(at(9, 40)).await.unwrap();

        assert_eq!(during_grace.evaluated, 0);
        assert_eq!(after_grace.evaluated, 1);
        assert_eq!(after_grace.absent, 1);
        assert_eq!(later.evaluated, 0);

        let record = store.get_attendance("u1", "math", "march 2025").await.unwrap();
        assert_eq!(record.absent.iter().copied().collect::<Vec<_>>(), vec![3]);
        assert!(record.present.is_empty());
        let job = &store.all_jobs().await[0];
        assert_eq!(job.status, TriggerJobStatus::Resolved);
        assert_eq!(job.outcome, Some(JobOutcome::AbsentNoLocation));
    }

    #[tokio::test]
    async fn test_sample_in_grace_window_marks_present() {
        let store = Arc::new(InMemoryAttendanceStore::new());
        seed(&store, "u1", "tok").await;
        pending_job(&store, "u1", monday(), at(9, 30)).await;
        let queue = build_queue(store.clone(), MockNotificationService::new());

        queue.process(at(9, 30)).await.unwrap();
        store
            .insert_location_sample(NewLocationSample {
                user_id: "u1".into(),
                subject_id: "math".into(),
                latitude: 0.0001,
                longitude: 0.0,
                captured_at: at(9, 32),
                received_at: at(9, 32),
            })
            .await
            .unwrap();
        let report = queue.process(at(9, 36)).await.unwrap();

        assert_eq!(report.present, 1);
        let record = store.get_attendance("u1", "math", "march 2025").await.unwrap();
        assert_eq!(record.mark_for(3), Some(AttendanceMark::Present));
        let job = &store.all_jobs().await[0];
        assert_eq!(job.outcome, Some(JobOutcome::Present));
        assert!(job.distance_meters.unwrap() < 50.0);
    }

    #[tokio::test]
    async fn test_dispatch_failure_resolves_without_retry() {
        let store = Arc::new(InMemoryAttendanceStore::new());
        seed(&store, "u1", "good").await;
        seed(&store, "u2", "bad").await;
        pending_job(&store, "u1", monday(), at(9, 30)).await;
        pending_job(&store, "u2", monday(), at(9, 30)).await;
        let notifier = MockNotificationService::new().failing_for("bad");
        let queue = build_queue(store.clone(), notifier.clone());

        let report = queue.process(at(9, 30)).await.unwrap();

        assert_eq!(report.dispatched, 1);
        assert_eq!(report.dispatch_failed, 1);
        let jobs = store.all_jobs().await;
        let failed = jobs.iter().find(|j| j.user_id == "u2").unwrap();
        assert_eq!(failed.status, TriggerJobStatus::Resolved);
        assert_eq!(failed.outcome, Some(JobOutcome::DispatchFailed));

        // Nothing is written to the ledger for an undelivered request.
        queue.process(at(9, 40)).await.unwrap();
        let record = store.get_attendance("u2", "math", "march 2025").await.unwrap();
        assert!(!record.is_decided(3));
        assert_eq!(notifier.sent().await.len(), 1);
    }

    #[tokio::test]
    async fn test_job_from_previous_day_expires() {
        let store = Arc::new(InMemoryAttendanceStore::new());
        seed(&store, "u1", "tok").await;
        let yesterday = monday().pred_opt().unwrap();
        pending_job(&store, "u1", yesterday, at(9, 30) - Duration::days(1)).await;
        let notifier = MockNotificationService::new();
        let queue = build_queue(store.clone(), notifier.clone());

        let report = queue.process(at(8, 0)).await.unwrap();

        assert_eq!(report.expired, 1);
        assert!(notifier.sent().await.is_empty());
        assert_eq!(
            store.all_jobs().await[0].outcome,
            Some(JobOutcome::Expired)
        );
    }

    #[tokio::test]
    async fn test_purge_uses_retention_settings() {
        let store = Arc::new(InMemoryAttendanceStore::new());
        seed(&store, "u1", "tok").await;
        store
            .insert_location_sample(NewLocationSample {
                user_id: "u1".into(),
                subject_id: "math".into(),
                latitude: 0.0,
                longitude: 0.0,
                captured_at: at(9, 0) - Duration::days(31),
                received_at: at(9, 0) - Duration::days(31),
            })
            .await
            .unwrap();
        let queue = build_queue(store.clone(), MockNotificationService::new());

        let report = queue.purge(at(9, 0)).await.unwrap();

        assert_eq!(report.samples_purged, 1);
        assert_eq!(report.jobs_purged, 0);
        assert_eq!(store.sample_count().await, 0);
    }

    #[tokio::test]
    async fn test_sample_captured_before_dispatch_is_not_timely() {
        let store = Arc::new(InMemoryAttendanceStore::new());
        seed(&store, "u1", "tok").await;
        pending_job(&store, "u1", monday(), at(9, 30)).await;
        store
            .insert_location_sample(NewLocationSample {
                user_id: "u1".into(),
                subject_id: "math".into(),
                latitude: 0.0,
                longitude: 0.0,
                captured_at: at(9, 26),
                received_at: at(9, 26),
            })
            .await
            .unwrap();
        let queue = build_queue(store.clone(), MockNotificationService::new());

        queue.process(at(9, 30)).await.unwrap();
        let report = queue.process(at(9, 35)).await.unwrap();

        assert_eq!(report.present, 0);
        assert_eq!(report.absent, 1);
        let job = &store.all_jobs().await[0];
        assert_eq!(job.outcome, Some(JobOutcome::AbsentNoLocation));
        let record = store.get_attendance("u1", "math", "march 2025").await.unwrap();
        assert_eq!(record.mark_for(3), Some(AttendanceMark::Absent));
    }

    #[tokio::test]
    async fn test_user_read_failure_leaves_job_pending() {
        let store = Arc::new(InMemoryAttendanceStore::new());
        seed(&store, "u1", "tok").await;
        pending_job(&store, "u1", monday(), at(9, 30)).await;
        store.fail_reads_for("get_user", "u1").await;
        let notifier = MockNotificationService::new();
        let queue = build_queue(store.clone(), notifier.clone());

        let first = queue.process(at(9, 30)).await.unwrap();

        assert_eq!(first.errors, 1);
        assert_eq!(first.dispatch_failed, 0);
        assert_eq!(store.all_jobs().await[0].status, TriggerJobStatus::Pending);
        assert!(notifier.sent().await.is_empty());

        store.restore_reads_for("get_user", "u1").await;
        let second = queue.process(at(9, 31)).await.unwrap();

        assert_eq!(second.dispatched, 1);
        let job = &store.all_jobs().await[0];
        assert_eq!(job.status, TriggerJobStatus::Dispatched);
        assert_eq!(job.dispatched_at, Some(at(9, 31)));
        assert_eq!(notifier.sent().await.len(), 1);
    }

    #[tokio::test]
    async fn test_mark_written_after_dispatch_is_reported_on_job() {
        let store = Arc::new(InMemoryAttendanceStore::new());
        seed(&store, "u1", "tok").await;
        pending_job(&store, "u1", monday(), at(9, 30)).await;
        let queue = build_queue(store.clone(), MockNotificationService::new());
        queue.process(at(9, 30)).await.unwrap();

        // The location fast path committed the day but has not resolved the job yet.
        store
            .mark_attendance(AttendanceEntry {
                user_id: "u1".into(),
                subject_id: "math".into(),
                month_key: "march 2025".into(),
                day: 3,
                decision: AttendanceDecision::present(12.5),
                decided_at: at(9, 32),
            })
            .await
            .unwrap();
        let report = queue.process(at(9, 35)).await.unwrap();

        assert_eq!(report.present, 1);
        let job = &store.all_jobs().await[0];
        assert_eq!(job.outcome, Some(JobOutcome::Present));
        assert_eq!(job.distance_meters, Some(12.5));
    }

    #[tokio::test]
    async fn test_mark_written_before_dispatch_reports_already_decided() {
        let store = Arc::new(InMemoryAttendanceStore::new());
        seed(&store, "u1", "tok").await;
        pending_job(&store, "u1", monday(), at(9, 30)).await;
        store
            .mark_attendance(AttendanceEntry {
                user_id: "u1".into(),
                subject_id: "math".into(),
                month_key: "march 2025".into(),
                day: 3,
                decision: AttendanceDecision::absent_no_location(),
                decided_at: at(9, 0),
            })
            .await
            .unwrap();
        let queue = build_queue(store.clone(), MockNotificationService::new());

        queue.process(at(9, 30)).await.unwrap();
        queue.process(at(9, 35)).await.unwrap();

        let job = &store.all_jobs().await[0];
        assert_eq!(job.outcome, Some(JobOutcome::AlreadyDecided));
        assert_eq!(job.distance_meters, None);
    }
}
