//! Subject entity (database row mapping).

use chrono::{DateTime, Utc};
use domain::models::schedule::WeeklySchedule;
use domain::models::subject::ClassLocation;
use sqlx::FromRow;

/// Database row mapping for the subjects table.
///
/// The class location is stored as three nullable columns; it only exists
/// when both coordinates are set.
#[derive(Debug, Clone, FromRow)]
pub struct SubjectEntity {
    pub user_id: String,
    pub subject_id: String,
    pub name: String,
    pub schedule: serde_json::Value,
    pub location_latitude: Option<f64>,
    pub location_longitude: Option<f64>,
    pub location_radius_meters: Option<f64>,
    pub auto_verify: Option<bool>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<SubjectEntity> for domain::models::Subject {
    type Error = serde_json::Error;

    fn try_from(entity: SubjectEntity) -> Result<Self, Self::Error> {
        let schedule: WeeklySchedule = serde_json::from_value(entity.schedule)?;
        Ok(Self {
            user_id: entity.user_id,
            subject_id: entity.subject_id,
            name: entity.name,
            schedule,
            location: ClassLocation::from_parts(
                entity.location_latitude,
                entity.location_longitude,
                entity.location_radius_meters,
            ),
            auto_verify: entity.auto_verify,
            created_at: entity.created_at,
            updated_at: entity.updated_at,
        })
    }
}
