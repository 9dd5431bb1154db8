// src/models/course.rs

use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use url::Url;
use validator::Validate;

use crate::models::lesson::LessonSummary;

/// Represents the 'courses' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Course {
    pub id: i64,

    pub title: String,

    /// URL-friendly identifier derived from the title, unique.
    pub slug: String,

    /// Course description, sanitized HTML.
    pub description: String,

    /// URL to the cover image.
    pub cover_img: Option<String>,

    pub is_published: bool,

    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Course detail including its published lessons.
#[derive(Debug, Serialize)]
pub struct CourseDetailResponse {
    #[serde(flatten)]
    pub course: Course,
    pub lessons: Vec<LessonSummary>,
}

/// DTO for creating a new course.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateCourseRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(max = 20000))]
    pub description: String,
    #[validate(length(max = 500), custom(function = validate_url_string))]
    pub cover_img: Option<String>,
}

/// DTO for publishing/unpublishing a course.
#[derive(Debug, Deserialize)]
pub struct PublishRequest {
    pub is_published: bool,
}

/// Query parameters for course listing.
#[derive(Debug, Deserialize)]
pub struct CourseListParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Validates that a string is a correctly formatted URL.
pub fn validate_url_string(url: &str) -> Result<(), validator::ValidationError> {
    if Url::parse(url).is_err() {
        return Err(validator::ValidationError::new("invalid_url"));
    }
    Ok(())
}
