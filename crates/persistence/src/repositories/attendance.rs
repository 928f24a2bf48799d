//! Attendance ledger repository for database operations.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::entities::AttendanceMarkEntity;
use crate::metrics::QueryTimer;

/// Input for a single ledger write.
#[derive(Debug, Clone)]
pub struct MarkInput<'a> {
    pub user_id: &'a str,
    pub subject_id: &'a str,
    pub month_key: &'a str,
    pub day: i16,
    pub mark: &'a str,
    pub reason: &'a str,
    pub distance_meters: Option<f64>,
    pub decided_at: DateTime<Utc>,
}

/// Repository for the attendance_marks table.
#[derive(Clone)]
pub struct AttendanceRepository {
    pool: PgPool,
}

impl AttendanceRepository {
    /// Creates a new AttendanceRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// All decided days of one month.
    pub async fn find_month(
        &self,
        user_id: &str,
        subject_id: &str,
        month_key: &str,
    ) -> Result<Vec<AttendanceMarkEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_attendance_month");
        let result = sqlx::query_as::<_, AttendanceMarkEntity>(
            r#"
            SELECT user_id, subject_id, month_key, day, mark, reason, distance_meters, decided_at
            FROM attendance_marks
            WHERE user_id = $1 AND subject_id = $2 AND month_key = $3
            ORDER BY day
            "#,
        )
        .bind(user_id)
        .bind(subject_id)
        .bind(month_key)
        .fetch_all(&self.pool)
        .await;
        timer.record();
        result
    }

    /// The mark stored for one day, if any.
    pub async fn find_day(
        &self,
        user_id: &str,
        subject_id: &str,
        month_key: &str,
        day: i16,
    ) -> Result<Option<AttendanceMarkEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_attendance_day");
        let result = sqlx::query_as::<_, AttendanceMarkEntity>(
            r#"
            SELECT user_id, subject_id, month_key, day, mark, reason, distance_meters, decided_at
            FROM attendance_marks
            WHERE user_id = $1 AND subject_id = $2 AND month_key = $3 AND day = $4
            "#,
        )
        .bind(user_id)
        .bind(subject_id)
        .bind(month_key)
        .bind(day)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Record a day if it is still undecided.
    /// Returns `true` when the row was inserted, `false` when the day already had a mark.
    pub async fn insert_if_undecided(&self, input: MarkInput<'_>) -> Result<bool, sqlx::Error> {
        let timer = QueryTimer::new("insert_attendance_mark");
        let result = sqlx::query(
            r#"
            INSERT INTO attendance_marks
                (user_id, subject_id, month_key, day, mark, reason, distance_meters, decided_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (user_id, subject_id, month_key, day) DO NOTHING
            "#,
        )
        .bind(input.user_id)
        .bind(input.subject_id)
        .bind(input.month_key)
        .bind(input.day)
        .bind(input.mark)
        .bind(input.reason)
        .bind(input.distance_meters)
        .bind(input.decided_at)
        .execute(&self.pool)
        .await;
        timer.record();
        Ok(result?.rows_affected() == 1)
    }
}
