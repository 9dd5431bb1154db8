// src/models/badge.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Represents the 'badges' table in the database (global catalog).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Badge {
    pub id: i64,
    /// Stable machine code, e.g. 'course-completion'.
    pub code: String,
    pub name: String,
    pub description: String,
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Badge awarded to a user, joined with the catalog entry.
#[derive(Debug, Serialize, FromRow)]
pub struct AwardedBadge {
    pub code: String,
    pub name: String,
    pub description: String,
    pub awarded_at: chrono::DateTime<chrono::Utc>,
}

/// DTO for creating a badge catalog entry.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateBadgeRequest {
    #[validate(length(min = 1, max = 50))]
    pub code: String,
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(max = 1000))]
    pub description: Option<String>,
}
