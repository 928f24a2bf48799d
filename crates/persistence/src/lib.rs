//! Persistence layer for the class attendance engine.
//!
//! This crate contains:
//! - Database connection management and migrations
//! - Entity definitions (database row mappings)
//! - Repository implementations
//! - [`store::PgAttendanceStore`], the PostgreSQL storage backend

pub mod db;
pub mod entities;
pub mod metrics;
pub mod repositories;
pub mod store;

pub use store::PgAttendanceStore;
