// src/models/lesson.rs

use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use validator::Validate;

use crate::models::course::validate_url_string;

/// Represents the 'lessons' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Lesson {
    pub id: i64,

    pub course_id: i64,

    pub title: String,

    /// Lesson body, sanitized HTML.
    pub content: Option<String>,

    /// URL of the hosted video for this lesson.
    pub video_url: Option<String>,

    /// Display order within the course.
    pub position: i32,

    /// Free lessons admit non-enrolled learners (including their quiz).
    pub is_free: bool,

    pub is_published: bool,

    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Compact lesson row for course detail listings.
#[derive(Debug, Serialize, FromRow)]
pub struct LessonSummary {
    pub id: i64,
    pub title: String,
    pub position: i32,
    pub is_free: bool,
    /// Whether a quiz is attached to this lesson.
    pub has_quiz: bool,
}

/// DTO for creating a new lesson.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateLessonRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(max = 50000))]
    pub content: Option<String>,
    #[validate(length(max = 500), custom(function = validate_url_string))]
    pub video_url: Option<String>,
    #[validate(range(min = 0))]
    pub position: Option<i32>,
    pub is_free: Option<bool>,
}
