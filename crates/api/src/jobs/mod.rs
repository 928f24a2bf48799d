//! Background jobs driving the attendance engine.

mod pool_metrics;
mod purge;
mod queue_processing;
mod scheduler;
mod trigger_scan;

use std::time::Duration;

use domain::services::AttendanceEngine;

pub use pool_metrics::PoolMetricsJob;
pub use purge::PurgeJob;
pub use queue_processing::QueueProcessingJob;
pub use scheduler::{Job, JobScheduler};
pub use trigger_scan::TriggerScanJob;

use crate::config::SchedulerConfig;

/// Registers the scan, queue and purge jobs at their configured cadence.
pub fn register_engine_jobs(
    scheduler: &mut JobScheduler,
    engine: &AttendanceEngine,
    config: &SchedulerConfig,
) {
    scheduler.register(TriggerScanJob::new(
        engine.clone(),
        Duration::from_secs(config.scan_interval_secs),
    ));
    scheduler.register(QueueProcessingJob::new(
        engine.clone(),
        Duration::from_secs(config.queue_interval_secs),
    ));
    scheduler.register(PurgeJob::new(
        engine.clone(),
        Duration::from_secs(config.purge_interval_secs),
    ));
}
