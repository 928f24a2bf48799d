//! Repository implementations for database operations.

pub mod attendance;
pub mod location_sample;
pub mod subject;
pub mod trigger_job;
pub mod user;

pub use attendance::{AttendanceRepository, MarkInput};
pub use location_sample::{LocationSampleRepository, SampleInput};
pub use subject::{SubjectInput, SubjectRepository};
pub use trigger_job::TriggerJobRepository;
pub use user::UserRepository;
