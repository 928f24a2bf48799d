//! Subject (enrolled class) domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::geo::Coordinate;
use validator::Validate;

use super::schedule::WeeklySchedule;

/// Geofence radius applied when a subject's location omits one.
pub const DEFAULT_RADIUS_METERS: f64 = 50.0;

/// Registered classroom location.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub radius_meters: f64,
}

impl ClassLocation {
    /// Builds a location from optional parts. Both coordinates are required;
    /// the radius falls back to [`DEFAULT_RADIUS_METERS`].
    pub fn from_parts(
        latitude: Option<f64>,
        longitude: Option<f64>,
        radius_meters: Option<f64>,
    ) -> Option<Self> {
        Some(Self {
            latitude: latitude?,
            longitude: longitude?,
            radius_meters: radius_meters.unwrap_or(DEFAULT_RADIUS_METERS),
        })
    }

    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }
}

/// A class a user is enrolled in.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub user_id: String,
    pub subject_id: String,
    pub name: String,
    pub schedule: WeeklySchedule,
    pub location: Option<ClassLocation>,
    /// `None` means the subject predates the opt-in flag and is scheduled.
    pub auto_verify: Option<bool>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Subject {
    /// Whether the scheduler should create verification jobs for this subject.
    pub fn is_auto_verified(&self) -> bool {
        self.auto_verify.unwrap_or(true)
    }
}

/// Storage-level upsert of a subject.
#[derive(Debug, Clone)]
pub struct SubjectUpsert {
    pub user_id: String,
    pub subject_id: String,
    pub name: String,
    pub schedule: WeeklySchedule,
    pub location: Option<ClassLocation>,
    pub auto_verify: Option<bool>,
}

/// Location part of a subject upsert request.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ClassLocationInput {
    #[validate(custom(function = "shared::validation::validate_latitude"))]
    pub latitude: Option<f64>,

    #[validate(custom(function = "shared::validation::validate_longitude"))]
    pub longitude: Option<f64>,

    #[validate(custom(function = "shared::validation::validate_radius"))]
    pub radius: Option<f64>,
}

/// Request payload for creating or replacing a subject.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpsertSubjectRequest {
    #[validate(length(min = 1, max = 200, message = "Name must be 1-200 characters"))]
    pub name: String,

    #[serde(default)]
    pub schedule: WeeklySchedule,

    #[validate(nested)]
    pub location: Option<ClassLocationInput>,

    pub auto_verify: Option<bool>,
}

impl UpsertSubjectRequest {
    pub fn into_upsert(self, user_id: String, subject_id: String) -> SubjectUpsert {
        let location = self
            .location
            .and_then(|l| ClassLocation::from_parts(l.latitude, l.longitude, l.radius));
        SubjectUpsert {
            user_id,
            subject_id,
            name: self.name,
            schedule: self.schedule,
            location,
            auto_verify: self.auto_verify,
        }
    }
}
