// src/handlers/course.rs

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use sqlx::PgPool;

use crate::{
    error::AppError,
    models::{
        course::{Course, CourseDetailResponse, CourseListParams},
        enrollment::Enrollment,
        lesson::LessonSummary,
        progress::LessonProgress,
    },
    utils::jwt::Claims,
};

/// Lists published courses, newest first.
pub async fn list_courses(
    State(pool): State<PgPool>,
    Query(params): Query<CourseListParams>,
) -> Result<impl IntoResponse, AppError> {
    let limit = params.limit.unwrap_or(20).clamp(1, 100);
    let offset = params.offset.unwrap_or(0).max(0);

    let courses = sqlx::query_as::<_, Course>(
        r#"
        SELECT id, title, slug, description, cover_img, is_published, created_at
        FROM courses
        WHERE is_published
        ORDER BY created_at DESC
        LIMIT $1 OFFSET $2
        "#,
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list courses: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(Json(courses))
}

/// Returns a published course together with its published lessons.
pub async fn get_course(
    State(pool): State<PgPool>,
    Path(course_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let course = sqlx::query_as::<_, Course>(
        r#"
        SELECT id, title, slug, description, cover_img, is_published, created_at
        FROM courses
        WHERE id = $1 AND is_published
        "#,
    )
    .bind(course_id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Course not found".to_string()))?;

    let lessons = sqlx::query_as::<_, LessonSummary>(
        r#"
        SELECT
            l.id, l.title, l.position, l.is_free,
            (q.id IS NOT NULL) AS has_quiz
        FROM lessons l
        LEFT JOIN quizzes q ON q.lesson_id = l.id
        WHERE l.course_id = $1 AND l.is_published
        ORDER BY l.position, l.id
        "#,
    )
    .bind(course_id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(CourseDetailResponse { course, lessons }))
}

/// Enrolls the current user into a published course.
///
/// Idempotent: the unique (user_id, course_id) constraint plus
/// ON CONFLICT DO NOTHING make a repeated enroll a no-op that returns
/// the existing enrollment.
pub async fn enroll(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(course_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.sub.parse::<i64>().unwrap_or(0);

    let exists = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM courses WHERE id = $1 AND is_published",
    )
    .bind(course_id)
    .fetch_one(&pool)
    .await?;

    if exists == 0 {
        return Err(AppError::NotFound("Course not found".to_string()));
    }

    let inserted = sqlx::query(
        r#"
        INSERT INTO enrollments (user_id, course_id)
        VALUES ($1, $2)
        ON CONFLICT (user_id, course_id) DO NOTHING
        "#,
    )
    .bind(user_id)
    .bind(course_id)
    .execute(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to enroll user {}: {:?}", user_id, e);
        AppError::InternalServerError(e.to_string())
    })?;

    let enrollment = sqlx::query_as::<_, Enrollment>(
        r#"
        SELECT id, user_id, course_id, status, progress, enrolled_at, completed_at
        FROM enrollments
        WHERE user_id = $1 AND course_id = $2
        "#,
    )
    .bind(user_id)
    .bind(course_id)
    .fetch_one(&pool)
    .await?;

    let status = if inserted.rows_affected() == 1 {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };

    Ok((status, Json(enrollment)))
}

/// Lists the current user's per-lesson progress within a course.
pub async fn course_progress(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(course_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.sub.parse::<i64>().unwrap_or(0);

    let progress = sqlx::query_as::<_, LessonProgress>(
        r#"
        SELECT lp.id, lp.user_id, lp.lesson_id, lp.is_completed,
               lp.completed_at, lp.time_spent_seconds
        FROM lesson_progress lp
        JOIN lessons l ON l.id = lp.lesson_id
        WHERE lp.user_id = $1 AND l.course_id = $2
        ORDER BY l.position, l.id
        "#,
    )
    .bind(user_id)
    .bind(course_id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(progress))
}
