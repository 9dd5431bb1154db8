// src/models/progress.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Represents the 'lesson_progress' table in the database.
/// One row per user+lesson, upserted, never duplicated.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct LessonProgress {
    pub id: i64,
    pub user_id: i64,
    pub lesson_id: i64,
    pub is_completed: bool,
    /// Set on first completion and never overwritten afterwards.
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub time_spent_seconds: i32,
}
