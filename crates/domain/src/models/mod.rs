//! Domain models for the class attendance engine.

pub mod attendance;
pub mod location_sample;
pub mod schedule;
pub mod subject;
pub mod trigger_job;
pub mod user;

pub use attendance::{AttendanceDecision, AttendanceMark, AttendanceRecord, MarkOutcome};
pub use location_sample::LocationSample;
pub use schedule::{ClassInterval, WeeklySchedule};
pub use subject::{ClassLocation, Subject};
pub use trigger_job::{JobOutcome, TriggerJob, TriggerJobStatus};
pub use user::User;
