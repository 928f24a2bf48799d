//! Domain services for the attendance engine.
//!
//! Services contain the scheduling and verification logic that operates on
//! domain models through the [`AttendanceStore`] seam.

pub mod engine;
pub mod geofence;
pub mod job_queue;
pub mod location_ingest;
pub mod memory_store;
pub mod notification;
pub mod settings;
pub mod store;
pub mod trigger_policy;
pub mod trigger_scheduler;

pub use engine::AttendanceEngine;
pub use geofence::{decide, Evaluation, GeofenceEvaluator};
pub use job_queue::{JobQueue, PurgeReport, QueueReport};
pub use location_ingest::{IngestError, IngestOutcome, LocationIngest, LocationSubmission};
pub use memory_store::InMemoryAttendanceStore;
pub use notification::{
    LocationRequestPayload, MockNotificationService, NotificationResult, NotificationService,
    NotificationType,
};
pub use settings::{EngineSettings, LocalNow};
pub use store::{AttendanceStore, StoreError};
pub use trigger_policy::TriggerPolicy;
pub use trigger_scheduler::{ScanReport, TriggerScheduler};
