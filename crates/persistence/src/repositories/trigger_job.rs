//! Trigger job repository for database operations.
//!
//! Status transitions are written as conditional updates so two workers
//! racing on the same job cannot both move it forward.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::entities::TriggerJobEntity;
use crate::metrics::QueryTimer;

const JOB_COLUMNS: &str = "id, user_id, subject_id, class_date, trigger_at, status, outcome, \
     distance_meters, created_at, dispatched_at, resolved_at";

/// Repository for trigger job database operations.
#[derive(Clone)]
pub struct TriggerJobRepository {
    pool: PgPool,
}

impl TriggerJobRepository {
    /// Creates a new TriggerJobRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a pending job unless one exists for the same class day.
    /// Returns `None` on conflict.
    pub async fn insert_pending(
        &self,
        user_id: &str,
        subject_id: &str,
        class_date: NaiveDate,
        trigger_at: DateTime<Utc>,
        created_at: DateTime<Utc>,
    ) -> Result<Option<TriggerJobEntity>, sqlx::Error> {
        let timer = QueryTimer::new("insert_trigger_job");
        let query = format!(
            r#"
            INSERT INTO trigger_jobs (id, user_id, subject_id, class_date, trigger_at, status, created_at)
            VALUES ($1, $2, $3, $4, $5, 'pending', $6)
            ON CONFLICT ON CONSTRAINT trigger_jobs_key DO NOTHING
            RETURNING {}
            "#,
            JOB_COLUMNS
        );
        let result = sqlx::query_as::<_, TriggerJobEntity>(&query)
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(subject_id)
            .bind(class_date)
            .bind(trigger_at)
            .bind(created_at)
            .fetch_optional(&self.pool)
            .await;
        timer.record();
        result
    }

    /// Find the job for a class day.
    pub async fn find_by_key(
        &self,
        user_id: &str,
        subject_id: &str,
        class_date: NaiveDate,
    ) -> Result<Option<TriggerJobEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_trigger_job_by_key");
        let query = format!(
            "SELECT {} FROM trigger_jobs WHERE user_id = $1 AND subject_id = $2 AND class_date = $3",
            JOB_COLUMNS
        );
        let result = sqlx::query_as::<_, TriggerJobEntity>(&query)
            .bind(user_id)
            .bind(subject_id)
            .bind(class_date)
            .fetch_optional(&self.pool)
            .await;
        timer.record();
        result
    }

    /// Pending jobs whose trigger instant has been reached.
    pub async fn find_pending_due(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<TriggerJobEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_pending_trigger_jobs");
        let query = format!(
            "SELECT {} FROM trigger_jobs WHERE status = 'pending' AND trigger_at <= $1 \
             ORDER BY trigger_at, created_at",
            JOB_COLUMNS
        );
        let result = sqlx::query_as::<_, TriggerJobEntity>(&query)
            .bind(now)
            .fetch_all(&self.pool)
            .await;
        timer.record();
        result
    }

    /// Move a job from pending to dispatched.
    /// Returns `false` when the job was no longer pending.
    pub async fn mark_dispatched(
        &self,
        job_id: Uuid,
        dispatched_at: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error> {
        let timer = QueryTimer::new("mark_trigger_job_dispatched");
        let result = sqlx::query(
            r#"
            UPDATE trigger_jobs
            SET status = 'dispatched', dispatched_at = $2
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(job_id)
        .bind(dispatched_at)
        .execute(&self.pool)
        .await;
        timer.record();
        Ok(result?.rows_affected() == 1)
    }

    /// Dispatched jobs sent at or before the cutoff.
    pub async fn find_dispatched_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<TriggerJobEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_dispatched_trigger_jobs");
        let query = format!(
            "SELECT {} FROM trigger_jobs WHERE status = 'dispatched' AND dispatched_at <= $1 \
             ORDER BY trigger_at, created_at",
            JOB_COLUMNS
        );
        let result = sqlx::query_as::<_, TriggerJobEntity>(&query)
            .bind(cutoff)
            .fetch_all(&self.pool)
            .await;
        timer.record();
        result
    }

    /// Resolve a job exactly once.
    /// Returns `false` when it was already resolved.
    pub async fn resolve(
        &self,
        job_id: Uuid,
        outcome: &str,
        distance_meters: Option<f64>,
        resolved_at: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error> {
        let timer = QueryTimer::new("resolve_trigger_job");
        let result = sqlx::query(
            r#"
            UPDATE trigger_jobs
            SET status = 'resolved', outcome = $2, distance_meters = $3, resolved_at = $4
            WHERE id = $1 AND status <> 'resolved'
            "#,
        )
        .bind(job_id)
        .bind(outcome)
        .bind(distance_meters)
        .bind(resolved_at)
        .execute(&self.pool)
        .await;
        timer.record();
        Ok(result?.rows_affected() == 1)
    }

    /// Jobs that are not resolved yet.
    pub async fn find_open(&self) -> Result<Vec<TriggerJobEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_open_trigger_jobs");
        let query = format!(
            "SELECT {} FROM trigger_jobs WHERE status <> 'resolved' ORDER BY trigger_at, created_at",
            JOB_COLUMNS
        );
        let result = sqlx::query_as::<_, TriggerJobEntity>(&query)
            .fetch_all(&self.pool)
            .await;
        timer.record();
        result
    }

    /// Delete resolved jobs created before the cutoff.
    /// Returns the number of deleted records.
    pub async fn delete_resolved_before(&self, cutoff: DateTime<Utc>) -> Result<u64, sqlx::Error> {
        let timer = QueryTimer::new("delete_resolved_trigger_jobs");
        let result = sqlx::query(
            r#"
            DELETE FROM trigger_jobs
            WHERE status = 'resolved' AND created_at < $1
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await;
        timer.record();
        Ok(result?.rows_affected())
    }
}
