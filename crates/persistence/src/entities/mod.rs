//! Database entity definitions.
//!
//! Entities are direct mappings to database rows.

pub mod attendance_mark;
pub mod location_sample;
pub mod subject;
pub mod trigger_job;
pub mod user;

pub use attendance_mark::AttendanceMarkEntity;
pub use location_sample::LocationSampleEntity;
pub use subject::SubjectEntity;
pub use trigger_job::TriggerJobEntity;
pub use user::UserEntity;
