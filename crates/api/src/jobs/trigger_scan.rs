//! Periodic schedule scan that creates the day's trigger jobs.

use std::time::Duration;

use domain::services::AttendanceEngine;
use tracing::info;

use super::scheduler::Job;
use crate::middleware::metrics::record_scan;

pub struct TriggerScanJob {
    engine: AttendanceEngine,
    interval: Duration,
}

impl TriggerScanJob {
    pub fn new(engine: AttendanceEngine, interval: Duration) -> Self {
        Self { engine, interval }
    }
}

#[async_trait::async_trait]
impl Job for TriggerScanJob {
    fn name(&self) -> &'static str {
        "trigger_scan"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn execute(&self) -> Result<(), String> {
        let report = self
            .engine
            .trigger_scan_now()
            .await
            .map_err(|e| format!("Schedule scan failed: {}", e))?;
        record_scan(&report);

        if report.jobs_created > 0 || report.failed_units > 0 {
            info!(
                day = %report.day_name,
                jobs_created = report.jobs_created,
                skipped_config = report.skipped_config,
                failed_units = report.failed_units,
                "Schedule scan finished"
            );
        }
        Ok(())
    }
}
