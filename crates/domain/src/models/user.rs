//! User domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// A student whose attendance is tracked.
///
/// Subjects are looked up by `user_id`; the user does not hold them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub user_id: String,
    pub display_name: Option<String>,
    /// Opaque device push address (FCM registration token).
    #[serde(skip_serializing)]
    pub push_token: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// The push token, if one is registered and non-blank.
    pub fn push_address(&self) -> Option<&str> {
        self.push_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

/// Storage-level upsert of a user.
#[derive(Debug, Clone)]
pub struct UserUpsert {
    pub user_id: String,
    pub display_name: Option<String>,
    pub push_token: Option<String>,
}

/// Request payload for creating or updating a user.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpsertUserRequest {
    #[validate(length(max = 100, message = "Display name must be at most 100 characters"))]
    pub display_name: Option<String>,

    #[validate(length(min = 1, max = 4096, message = "Push token must be 1-4096 characters"))]
    pub push_token: Option<String>,
}

/// Response payload for user operations.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub has_push_token: bool,
    pub updated_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            has_push_token: user.push_address().is_some(),
            user_id: user.user_id,
            display_name: user.display_name,
            updated_at: user.updated_at,
        }
    }
}
