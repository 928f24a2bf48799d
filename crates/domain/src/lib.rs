//! Domain layer for the class attendance engine.
//!
//! This crate contains:
//! - Domain models (User, Subject, WeeklySchedule, AttendanceRecord, TriggerJob)
//! - The storage and notification seams
//! - Scheduling, dispatch, ingest and geofence evaluation services

pub mod models;
pub mod services;
