//! Trigger job entity (database row mapping).

use chrono::{DateTime, NaiveDate, Utc};
use domain::models::trigger_job::{JobOutcome, TriggerJobStatus};
use sqlx::FromRow;
use uuid::Uuid;

/// Database row mapping for the trigger_jobs table.
#[derive(Debug, Clone, FromRow)]
pub struct TriggerJobEntity {
    pub id: Uuid,
    pub user_id: String,
    pub subject_id: String,
    pub class_date: NaiveDate,
    pub trigger_at: DateTime<Utc>,
    pub status: String,
    pub outcome: Option<String>,
    pub distance_meters: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub dispatched_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl TryFrom<TriggerJobEntity> for domain::models::TriggerJob {
    type Error = String;

    fn try_from(entity: TriggerJobEntity) -> Result<Self, Self::Error> {
        let status: TriggerJobStatus = entity.status.parse()?;
        let outcome = entity
            .outcome
            .as_deref()
            .map(str::parse::<JobOutcome>)
            .transpose()?;
        Ok(Self {
            id: entity.id,
            user_id: entity.user_id,
            subject_id: entity.subject_id,
            class_date: entity.class_date,
            trigger_at: entity.trigger_at,
            status,
            outcome,
            distance_meters: entity.distance_meters,
            created_at: entity.created_at,
            dispatched_at: entity.dispatched_at,
            resolved_at: entity.resolved_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::models::TriggerJob;

    fn create_test_job_entity() -> TriggerJobEntity {
        TriggerJobEntity {
            id: Uuid::new_v4(),
            user_id: "uid-1".to_string(),
            subject_id: "math".to_string(),
            class_date: NaiveDate::from_ymd_opt(2025, 3, 3).unwrap(),
            trigger_at: Utc::now(),
            status: "resolved".to_string(),
            outcome: Some("absent_no_location".to_string()),
            distance_meters: None,
            created_at: Utc::now(),
            dispatched_at: Some(Utc::now()),
            resolved_at: Some(Utc::now()),
        }
    }

    #[test]
    fn test_job_entity_to_domain() {
        let entity = create_test_job_entity();
        let job = TriggerJob::try_from(entity.clone()).unwrap();

        assert_eq!(job.id, entity.id);
        assert_eq!(job.status, TriggerJobStatus::Resolved);
        assert_eq!(job.outcome, Some(JobOutcome::AbsentNoLocation));
    }

    #[test]
    fn test_job_entity_pending_without_outcome() {
        let mut entity = create_test_job_entity();
        entity.status = "pending".to_string();
        entity.outcome = None;

        let job = TriggerJob::try_from(entity).unwrap();
        assert_eq!(job.status, TriggerJobStatus::Pending);
        assert!(job.outcome.is_none());
    }

    #[test]
    fn test_job_entity_rejects_unknown_status() {
        let mut entity = create_test_job_entity();
        entity.status = "cancelled".to_string();

        assert!(TriggerJob::try_from(entity).is_err());
    }
}
