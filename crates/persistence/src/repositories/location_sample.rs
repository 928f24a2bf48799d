//! Location sample repository for database operations.

use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::entities::LocationSampleEntity;
use crate::metrics::QueryTimer;

/// Input for storing a location sample.
#[derive(Debug, Clone)]
pub struct SampleInput<'a> {
    pub user_id: &'a str,
    pub subject_id: &'a str,
    pub latitude: f64,
    pub longitude: f64,
    pub captured_at: DateTime<Utc>,
    pub received_at: DateTime<Utc>,
}

/// Repository for location sample database operations.
#[derive(Clone)]
pub struct LocationSampleRepository {
    pool: PgPool,
}

impl LocationSampleRepository {
    /// Creates a new LocationSampleRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Store a sample.
    pub async fn insert(&self, input: SampleInput<'_>) -> Result<LocationSampleEntity, sqlx::Error> {
        let timer = QueryTimer::new("insert_location_sample");
        let result = sqlx::query_as::<_, LocationSampleEntity>(
            r#"
            INSERT INTO location_samples
                (id, user_id, subject_id, latitude, longitude, captured_at, received_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, user_id, subject_id, latitude, longitude, captured_at, received_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(input.user_id)
        .bind(input.subject_id)
        .bind(input.latitude)
        .bind(input.longitude)
        .bind(input.captured_at)
        .bind(input.received_at)
        .fetch_one(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Most recently captured sample within `[from, to]`.
    pub async fn find_latest_between(
        &self,
        user_id: &str,
        subject_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Option<LocationSampleEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_latest_location_sample");
        let result = sqlx::query_as::<_, LocationSampleEntity>(
            r#"
            SELECT id, user_id, subject_id, latitude, longitude, captured_at, received_at
            FROM location_samples
            WHERE user_id = $1 AND subject_id = $2
              AND captured_at >= $3 AND captured_at <= $4
            ORDER BY captured_at DESC, received_at DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(subject_id)
        .bind(from)
        .bind(to)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Delete samples captured before the cutoff.
    /// Returns the number of deleted records.
    pub async fn delete_captured_before(&self, cutoff: DateTime<Utc>) -> Result<u64, sqlx::Error> {
        let timer = QueryTimer::new("delete_old_location_samples");
        let result = sqlx::query(
            r#"
            DELETE FROM location_samples
            WHERE captured_at < $1
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await;
        timer.record();
        Ok(result?.rows_affected())
    }
}
