//! External service integrations.

pub mod fcm;

pub use fcm::{FcmError, FcmNotificationService};
