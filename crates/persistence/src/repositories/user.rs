//! User repository for database operations.

use sqlx::PgPool;

use crate::entities::UserEntity;
use crate::metrics::QueryTimer;

/// Repository for user-related database operations.
#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    /// Creates a new UserRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a user or update the provided fields of an existing one.
    /// Fields passed as `None` keep their stored value.
    pub async fn upsert(
        &self,
        user_id: &str,
        display_name: Option<&str>,
        push_token: Option<&str>,
    ) -> Result<UserEntity, sqlx::Error> {
        let timer = QueryTimer::new("upsert_user");
        let result = sqlx::query_as::<_, UserEntity>(
            r#"
            INSERT INTO users (user_id, display_name, push_token)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id) DO UPDATE SET
                display_name = COALESCE(EXCLUDED.display_name, users.display_name),
                push_token = COALESCE(EXCLUDED.push_token, users.push_token),
                updated_at = NOW()
            RETURNING user_id, display_name, push_token, created_at, updated_at
            "#,
        )
        .bind(user_id)
        .bind(display_name)
        .bind(push_token)
        .fetch_one(&self.pool)
        .await;
        timer.record();
        result
    }

    /// Find a user by id.
    pub async fn find_by_id(&self, user_id: &str) -> Result<Option<UserEntity>, sqlx::Error> {
        let timer = QueryTimer::new("find_user_by_id");
        let result = sqlx::query_as::<_, UserEntity>(
            r#"
            SELECT user_id, display_name, push_token, created_at, updated_at
            FROM users
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await;
        timer.record();
        result
    }

    /// List all users ordered by id.
    pub async fn list_all(&self) -> Result<Vec<UserEntity>, sqlx::Error> {
        let timer = QueryTimer::new("list_users");
        let result = sqlx::query_as::<_, UserEntity>(
            r#"
            SELECT user_id, display_name, push_token, created_at, updated_at
            FROM users
            ORDER BY user_id
            "#,
        )
        .fetch_all(&self.pool)
        .await;
        timer.record();
        result
    }
}
