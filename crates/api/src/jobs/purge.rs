//! Retention purge for resolved jobs and old location samples.

use std::time::Duration;

use chrono::Utc;
use domain::services::AttendanceEngine;
use tracing::info;

use super::scheduler::Job;

pub struct PurgeJob {
    engine: AttendanceEngine,
    interval: Duration,
}

impl PurgeJob {
    pub fn new(engine: AttendanceEngine, interval: Duration) -> Self {
        Self { engine, interval }
    }
}

#[async_trait::async_trait]
impl Job for PurgeJob {
    fn name(&self) -> &'static str {
        "retention_purge"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn run_at_start(&self) -> bool {
        false
    }

    async fn execute(&self) -> Result<(), String> {
        let report = self
            .engine
            .purge_at(Utc::now())
            .await
            .map_err(|e| format!("Retention purge failed: {}", e))?;

        info!(
            jobs_purged = report.jobs_purged,
            samples_purged = report.samples_purged,
            "Retention purge finished"
        );
        Ok(())
    }
}
