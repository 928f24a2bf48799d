//! Shared utilities for the class attendance backend.
//!
//! This crate provides functionality used across the other crates:
//! - Great-circle distance math
//! - Common validation logic

pub mod geo;
pub mod validation;
