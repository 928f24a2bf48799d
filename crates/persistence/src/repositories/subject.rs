//! Subject repository for database operations.

use sqlx::PgPool;

use crate::entities::SubjectEntity;
use crate::metrics::QueryTimer;

const SUBJECT_COLUMNS: &str = "user_id, subject_id, name, schedule, location_latitude, \
     location_longitude, location_radius_meters, auto_verify, created_at, updated_at";

/// Input for creating or replacing a subject row.
#[derive(Debug, Clone)]
pub struct SubjectInput<'a> {
    pub user_id: &'a str,
    pub subject_id: &'a str,
    pub name: &'a str,
    pub schedule: serde_json::Value,
    pub location_latitude: Option<f64>,
    pub location_longitude: Option<f64>,
    pub location_radius_meters: Option<f64>,
    pub auto_verify: Option<bool>,
}

/// Repository for subject-related database operations.
#[derive(Clone)]
pub struct SubjectRepository {
    pool: PgPool,
}

impl SubjectRepository {
    /// Creates a new SubjectRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert or fully replace a subject.
    /// Fails with a foreign key violation when the user does not exist.
    pub async fn upsert(&self, input: SubjectInput<'_>) -> Result<SubjectEntity, sqlx::Error> {
        let timer = QueryTimer::new("upsert_subject");
        let query = format!(
            r#"
            INSERT INTO subjects (user_id, subject_id, name, schedule, location_latitude,
                                  location_longitude, location_radius_meters, auto_verify)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (user_id, subject_id) DO UPDATE SET
                name = EXCLUDED.name,
                schedule = EXCLUDED.schedule,
                location_latitude = EXCLUDED.location_latitude,
                location_longitude = EXCLUDED.location_longitude,
                location_radius_meters = EXCLUDED.location_radius_meters,
                auto_verify = EXCLUDED.auto_verify,
                updated_at = NOW()
            RETURNING {}
            "#,
            SUBJECT_COLUMNS
        );
        let result = sqlx::query_as::<_, SubjectEntity>(&query)
            .bind(input.user_id)
            .bind(input.subject_id)
            .bind(input.name)
            .bind(input.schedule)
            .bind(input.location_latitude)
            .bind(input.location_longitude)
            .bind(input.location_radius_meters)
            .bind(input.auto_verify)
            .fetch_one(&self.pool)
            .await;
        timer.record();
        result
    }

    /// Find one subject of a user.
    pub async fn find(
        &self,
        user_id: &str,
        subject_id: &str,
    ) -> Result<Option<SubjectEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_subject");
        let query = format!(
            "SELECT {} FROM subjects WHERE user_id = $1 AND subject_id = $2",
            SUBJECT_COLUMNS
        );
        let result = sqlx::query_as::<_, SubjectEntity>(&query)
            .bind(user_id)
            .bind(subject_id)
            .fetch_optional(&self.pool)
            .await;
        timer.record();
        result
    }

    /// All subjects of a user, ordered by id.
    pub async fn find_by_user(&self, user_id: &str) -> Result<Vec<SubjectEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_subjects_by_user");
        let query = format!(
            "SELECT {} FROM subjects WHERE user_id = $1 ORDER BY subject_id",
            SUBJECT_COLUMNS
        );
        let result = sqlx::query_as::<_, SubjectEntity>(&query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await;
        timer.record();
        result
    }
}
