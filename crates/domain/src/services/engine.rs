//! Attendance engine facade used by the HTTP layer and the background jobs.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::job_queue::{JobQueue, PurgeReport, QueueReport};
use super::location_ingest::{IngestError, IngestOutcome, LocationIngest, LocationSubmission};
use super::notification::NotificationService;
use super::settings::EngineSettings;
use super::store::{AttendanceStore, StoreError};
use super::trigger_scheduler::{ScanReport, TriggerScheduler};
use crate::models::attendance::AttendanceRecord;
use crate::models::trigger_job::{OpenJobItem, OpenJobsResponse, TriggerJobStatus};

/// Wires scheduler, queue and ingest around one store and one notifier.
#[derive(Clone)]
pub struct AttendanceEngine {
    store: Arc<dyn AttendanceStore>,
    scheduler: TriggerScheduler,
    queue: JobQueue,
    ingest: LocationIngest,
    settings: EngineSettings,
}

impl AttendanceEngine {
    pub fn new(
        store: Arc<dyn AttendanceStore>,
        notifier: Arc<dyn NotificationService>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            scheduler: TriggerScheduler::new(store.clone(), settings),
            queue: JobQueue::new(store.clone(), notifier, settings),
            ingest: LocationIngest::new(store.clone(), settings),
            store,
            settings,
        }
    }

    pub fn store(&self) -> &Arc<dyn AttendanceStore> {
        &self.store
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Runs a schedule scan now.
    pub async fn trigger_scan_now(&self) -> Result<ScanReport, StoreError> {
        self.scheduler.scan(Utc::now()).await
    }

    /// Runs a queue pass now.
    pub async fn trigger_queue_processing_now(&self) -> Result<QueueReport, StoreError> {
        self.queue.process(Utc::now()).await
    }

    pub async fn scan_at(&self, now: DateTime<Utc>) -> Result<ScanReport, StoreError> {
        self.scheduler.scan(now).await
    }

    pub async fn process_queue_at(&self, now: DateTime<Utc>) -> Result<QueueReport, StoreError> {
        self.queue.process(now).await
    }

    pub async fn purge_at(&self, now: DateTime<Utc>) -> Result<PurgeReport, StoreError> {
        self.queue.purge(now).await
    }

    pub async fn submit_location(
        &self,
        submission: LocationSubmission,
    ) -> Result<IngestOutcome, IngestError> {
        self.ingest.submit(submission, Utc::now()).await
    }

    /// Jobs not yet resolved; `pending_count` counts those not yet dispatched.
    pub async fn open_jobs(&self) -> Result<OpenJobsResponse, StoreError> {
        let jobs = self.store.open_trigger_jobs().await?;
        let pending_count = jobs
            .iter()
            .filter(|j| j.status == TriggerJobStatus::Pending)
            .count();
        Ok(OpenJobsResponse {
            pending_count,
            jobs: jobs.into_iter().map(OpenJobItem::from).collect(),
        })
    }

    pub async fn attendance(
        &self,
        user_id: &str,
        subject_id: &str,
        month_key: &str,
    ) -> Result<AttendanceRecord, StoreError> {
        self.store.get_attendance(user_id, subject_id, month_key).await
    }
}
