//! Location sample entity (database row mapping).

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// Database row mapping for the location_samples table.
#[derive(Debug, Clone, FromRow)]
pub struct LocationSampleEntity {
    pub id: Uuid,
    pub user_id: String,
    pub subject_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub captured_at: DateTime<Utc>,
    pub received_at: DateTime<Utc>,
}

impl From<LocationSampleEntity> for domain::models::LocationSample {
    fn from(entity: LocationSampleEntity) -> Self {
        Self {
            id: entity.id,
            user_id: entity.user_id,
            subject_id: entity.subject_id,
            latitude: entity.latitude,
            longitude: entity.longitude,
            captured_at: entity.captured_at,
            received_at: entity.received_at,
        }
    }
}
