//! Periodic queue pass: dispatch due jobs and evaluate expired grace windows.

use std::time::Duration;

use domain::services::AttendanceEngine;
use tracing::info;

use super::scheduler::Job;
use crate::middleware::metrics::record_queue_pass;

pub struct QueueProcessingJob {
    engine: AttendanceEngine,
    interval: Duration,
}

impl QueueProcessingJob {
    pub fn new(engine: AttendanceEngine, interval: Duration) -> Self {
        Self { engine, interval }
    }
}

#[async_trait::async_trait]
impl Job for QueueProcessingJob {
    fn name(&self) -> &'static str {
        "queue_processing"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    async fn execute(&self) -> Result<(), String> {
        let report = self
            .engine
            .trigger_queue_processing_now()
            .await
            .map_err(|e| format!("Queue pass failed: {}", e))?;
        record_queue_pass(&report);

        if report.dispatched + report.evaluated + report.expired + report.errors > 0 {
            info!(
                dispatched = report.dispatched,
                dispatch_failed = report.dispatch_failed,
                evaluated = report.evaluated,
                present = report.present,
                absent = report.absent,
                expired = report.expired,
                errors = report.errors,
                "Queue pass finished"
            );
        }
        Ok(())
    }
}
