//! User entity (database row mapping).

use chrono::{DateTime, Utc};
use sqlx::FromRow;

/// Database row mapping for the users table.
#[derive(Debug, Clone, FromRow)]
pub struct UserEntity {
    pub user_id: String,
    pub display_name: Option<String>,
    pub push_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<UserEntity> for domain::models::User {
    fn from(entity: UserEntity) -> Self {
        Self {
            user_id: entity.user_id,
            display_name: entity.display_name,
            push_token: entity.push_token,
            created_at: entity.created_at,
            updated_at: entity.updated_at,
        }
    }
}
