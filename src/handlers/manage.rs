// src/handlers/manage.rs
//
// Staff surface: course/lesson authoring, quiz and question management,
// badge catalog, and manual essay grading. Routed behind auth + staff
// middleware; user listing is additionally admin-only.

use std::collections::HashMap;

use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::{Value, json};
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use crate::{
    cascade,
    error::{AppError, is_unique_violation},
    grading,
    models::{
        attempt::{AttemptStatus, QuizAttempt},
        badge::{Badge, CreateBadgeRequest},
        course::{Course, CreateCourseRequest, PublishRequest},
        lesson::{CreateLessonRequest, Lesson},
        quiz::{CreateQuestionRequest, CreateQuizRequest, Question, Quiz, QuizContext},
        user::User,
    },
    utils::{html::clean_html, jwt::Claims, slug::slugify},
};

/// Lists all users in the system. Admin only.
pub async fn list_users(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    if claims.role != "admin" {
        return Err(AppError::Forbidden("Admin access required".to_string()));
    }

    let users = sqlx::query_as::<_, User>(
        r#"
        SELECT id, username, password, role, created_at
        FROM users
        ORDER BY id DESC
        "#,
    )
    .fetch_all(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to list users: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(Json(users))
}

/// Creates a new course (unpublished). The slug is derived from the
/// title; on a collision a random suffix is appended and the insert is
/// retried once.
pub async fn create_course(
    State(pool): State<PgPool>,
    Json(payload): Json<CreateCourseRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let description = clean_html(&payload.description);
    let slug = slugify(&payload.title);

    let insert = |slug: String| {
        let pool = pool.clone();
        let title = payload.title.clone();
        let description = description.clone();
        let cover_img = payload.cover_img.clone();
        async move {
            sqlx::query_as::<_, Course>(
                r#"
                INSERT INTO courses (title, slug, description, cover_img)
                VALUES ($1, $2, $3, $4)
                RETURNING id, title, slug, description, cover_img, is_published, created_at
                "#,
            )
            .bind(title)
            .bind(slug)
            .bind(description)
            .bind(cover_img)
            .fetch_one(&pool)
            .await
        }
    };

    let course = match insert(slug.clone()).await {
        Ok(course) => course,
        Err(e) if is_unique_violation(&e) => {
            let suffixed = format!("{}-{}", slug, &Uuid::new_v4().simple().to_string()[..6]);
            insert(suffixed).await.map_err(|e| {
                tracing::error!("Failed to create course: {:?}", e);
                AppError::from(e)
            })?
        }
        Err(e) => {
            tracing::error!("Failed to create course: {:?}", e);
            return Err(AppError::from(e));
        }
    };

    Ok((StatusCode::CREATED, Json(course)))
}

/// Publishes or unpublishes a course.
pub async fn publish_course(
    State(pool): State<PgPool>,
    Path(course_id): Path<i64>,
    Json(payload): Json<PublishRequest>,
) -> Result<impl IntoResponse, AppError> {
    let result = sqlx::query("UPDATE courses SET is_published = $2 WHERE id = $1")
        .bind(course_id)
        .bind(payload.is_published)
        .execute(&pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Course not found".to_string()));
    }

    Ok(Json(json!({ "is_published": payload.is_published })))
}

/// Creates a lesson under a course.
pub async fn create_lesson(
    State(pool): State<PgPool>,
    Path(course_id): Path<i64>,
    Json(payload): Json<CreateLessonRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let course_exists = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM courses WHERE id = $1")
        .bind(course_id)
        .fetch_one(&pool)
        .await?;
    if course_exists == 0 {
        return Err(AppError::NotFound("Course not found".to_string()));
    }

    let content = payload.content.as_deref().map(clean_html);

    let lesson = sqlx::query_as::<_, Lesson>(
        r#"
        INSERT INTO lessons (course_id, title, content, video_url, position, is_free)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id, course_id, title, content, video_url, position,
                  is_free, is_published, created_at
        "#,
    )
    .bind(course_id)
    .bind(&payload.title)
    .bind(content)
    .bind(&payload.video_url)
    .bind(payload.position.unwrap_or(0))
    .bind(payload.is_free.unwrap_or(false))
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to create lesson: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok((StatusCode::CREATED, Json(lesson)))
}

/// Publishes or unpublishes a lesson.
pub async fn publish_lesson(
    State(pool): State<PgPool>,
    Path(lesson_id): Path<i64>,
    Json(payload): Json<PublishRequest>,
) -> Result<impl IntoResponse, AppError> {
    let result = sqlx::query("UPDATE lessons SET is_published = $2 WHERE id = $1")
        .bind(lesson_id)
        .bind(payload.is_published)
        .execute(&pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Lesson not found".to_string()));
    }

    Ok(Json(json!({ "is_published": payload.is_published })))
}

/// Attaches a quiz to a lesson. One quiz per lesson, enforced by the
/// unique constraint.
pub async fn create_quiz(
    State(pool): State<PgPool>,
    Path(lesson_id): Path<i64>,
    Json(payload): Json<CreateQuizRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let lesson_exists = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM lessons WHERE id = $1")
        .bind(lesson_id)
        .fetch_one(&pool)
        .await?;
    if lesson_exists == 0 {
        return Err(AppError::NotFound("Lesson not found".to_string()));
    }

    let quiz = sqlx::query_as::<_, Quiz>(
        r#"
        INSERT INTO quizzes (lesson_id, title, passing_score, max_attempts,
                             time_limit_minutes, randomize_questions, show_results_immediately)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING id, lesson_id, title, passing_score, max_attempts,
                  time_limit_minutes, randomize_questions, show_results_immediately, created_at
        "#,
    )
    .bind(lesson_id)
    .bind(&payload.title)
    .bind(payload.passing_score)
    .bind(payload.max_attempts)
    .bind(payload.time_limit_minutes)
    .bind(payload.randomize_questions.unwrap_or(false))
    .bind(payload.show_results_immediately.unwrap_or(true))
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict("Lesson already has a quiz".to_string())
        } else {
            tracing::error!("Failed to create quiz: {:?}", e);
            AppError::from(e)
        }
    })?;

    Ok((StatusCode::CREATED, Json(quiz)))
}

/// Adds a question to a quiz. The answer shape is validated against the
/// question type before anything is written.
pub async fn create_question(
    State(pool): State<PgPool>,
    Path(quiz_id): Path<i64>,
    Json(payload): Json<CreateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }
    payload.validate_shape().map_err(AppError::BadRequest)?;

    let quiz_exists = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM quizzes WHERE id = $1")
        .bind(quiz_id)
        .fetch_one(&pool)
        .await?;
    if quiz_exists == 0 {
        return Err(AppError::NotFound("Quiz not found".to_string()));
    }

    let question = insert_question(&pool, quiz_id, &payload).await.map_err(|e| {
        tracing::error!("Failed to create question: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok((StatusCode::CREATED, Json(question)))
}

/// Replaces a question definition. Refused while any attempt on the
/// owning quiz is live: a quiz is immutable during an attempt.
pub async fn update_question(
    State(pool): State<PgPool>,
    Path(question_id): Path<i64>,
    Json(payload): Json<CreateQuestionRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }
    payload.validate_shape().map_err(AppError::BadRequest)?;

    ensure_no_live_attempts(&pool, question_id).await?;

    let question = sqlx::query_as::<_, Question>(
        r#"
        UPDATE questions
        SET question_type = $2, prompt = $3, options = $4, correct_answer = $5,
            points = $6, explanation = $7, position = COALESCE($8, position)
        WHERE id = $1
        RETURNING id, quiz_id, question_type, prompt, options, correct_answer,
                  points, explanation, position, created_at
        "#,
    )
    .bind(question_id)
    .bind(payload.question_type)
    .bind(&payload.prompt)
    .bind(payload.options.as_ref().map(sqlx::types::Json))
    .bind(sqlx::types::Json(
        payload.correct_answer.clone().unwrap_or(Value::Null),
    ))
    .bind(payload.points)
    .bind(&payload.explanation)
    .bind(payload.position)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Question not found".to_string()))?;

    Ok(Json(question))
}

/// Removes a question from its quiz. Refused while any attempt on the
/// owning quiz is live.
pub async fn delete_question(
    State(pool): State<PgPool>,
    Path(question_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    ensure_no_live_attempts(&pool, question_id).await?;

    let result = sqlx::query("DELETE FROM questions WHERE id = $1")
        .bind(question_id)
        .execute(&pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Question not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Creates a badge catalog entry.
pub async fn create_badge(
    State(pool): State<PgPool>,
    Json(payload): Json<CreateBadgeRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(validation_errors) = payload.validate() {
        return Err(AppError::BadRequest(validation_errors.to_string()));
    }

    let badge = sqlx::query_as::<_, Badge>(
        r#"
        INSERT INTO badges (code, name, description)
        VALUES ($1, $2, $3)
        RETURNING id, code, name, description, created_at
        "#,
    )
    .bind(&payload.code)
    .bind(&payload.name)
    .bind(payload.description.as_deref().unwrap_or(""))
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            AppError::Conflict(format!("Badge '{}' already exists", payload.code))
        } else {
            tracing::error!("Failed to create badge: {:?}", e);
            AppError::from(e)
        }
    })?;

    Ok((StatusCode::CREATED, Json(badge)))
}

/// DTO for confirming essay points on a submitted attempt.
#[derive(Debug, Deserialize)]
pub struct ManualGradeRequest {
    /// Points awarded per essay question id. Clamped to each question's
    /// point value; points for non-essay questions are ignored.
    pub scores: HashMap<i64, i32>,
}

/// Finalizes a submitted attempt that contains essay questions.
///
/// Re-grades the stored answers with the staff-awarded essay points,
/// persists the final verdict, and fires the completion cascade on a
/// pass. The attempt must still be awaiting manual grading; the guarded
/// UPDATE makes double confirmation a no-op error rather than a second
/// cascade.
pub async fn grade_attempt(
    State(pool): State<PgPool>,
    Path(attempt_id): Path<i64>,
    Json(payload): Json<ManualGradeRequest>,
) -> Result<impl IntoResponse, AppError> {
    let attempt = sqlx::query_as::<_, QuizAttempt>(
        r#"
        SELECT id, user_id, quiz_id, attempt_number, status, started_at,
               submitted_at, answers, score, max_score, percentage, is_passed,
               time_spent_seconds, requires_manual_grading
        FROM quiz_attempts
        WHERE id = $1
        "#,
    )
    .bind(attempt_id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Attempt not found".to_string()))?;

    if attempt.status != AttemptStatus::Submitted || !attempt.requires_manual_grading {
        return Err(AppError::BadRequest(
            "Attempt does not require manual grading".to_string(),
        ));
    }

    // Unlike the learner-facing path, grading staff may reach quizzes on
    // lessons that have since been unpublished.
    let quiz = sqlx::query_as::<_, QuizContext>(
        r#"
        SELECT
            q.id, q.lesson_id, l.course_id, l.is_free AS lesson_is_free,
            q.title, q.passing_score, q.max_attempts, q.time_limit_minutes,
            q.randomize_questions, q.show_results_immediately
        FROM quizzes q
        JOIN lessons l ON l.id = q.lesson_id
        WHERE q.id = $1
        "#,
    )
    .bind(attempt.quiz_id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Quiz not found".to_string()))?;

    let questions = sqlx::query_as::<_, Question>(
        r#"
        SELECT id, quiz_id, question_type, prompt, options, correct_answer,
               points, explanation, position, created_at
        FROM questions
        WHERE quiz_id = $1
        ORDER BY position, id
        "#,
    )
    .bind(attempt.quiz_id)
    .fetch_all(&pool)
    .await?;

    let summary = grading::grade(
        &questions,
        &attempt.answers.0,
        &payload.scores,
        quiz.passing_score,
    );

    if summary.pending_manual {
        return Err(AppError::BadRequest(
            "Points missing for answered essay questions".to_string(),
        ));
    }

    let updated = sqlx::query_as::<_, QuizAttempt>(
        r#"
        UPDATE quiz_attempts
        SET score = $2, percentage = $3, is_passed = $4, requires_manual_grading = FALSE
        WHERE id = $1 AND requires_manual_grading
        RETURNING id, user_id, quiz_id, attempt_number, status, started_at,
                  submitted_at, answers, score, max_score, percentage, is_passed,
                  time_spent_seconds, requires_manual_grading
        "#,
    )
    .bind(attempt_id)
    .bind(summary.score)
    .bind(summary.percentage)
    .bind(summary.is_passed)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::BadRequest("Attempt already finalized".to_string()))?;

    if summary.is_passed {
        cascade::run(&pool, attempt.user_id, quiz.lesson_id, quiz.course_id).await;
    }

    Ok(Json(json!({
        "attempt": updated,
        "results": {
            "score": summary.score,
            "max_score": summary.max_score,
            "percentage": summary.percentage,
            "passed": summary.is_passed,
        }
    })))
}

/// Rejects question mutations while the owning quiz has an in-progress
/// attempt.
async fn ensure_no_live_attempts(pool: &PgPool, question_id: i64) -> Result<(), AppError> {
    let live = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*) FROM quiz_attempts
        WHERE quiz_id = (SELECT quiz_id FROM questions WHERE id = $1)
          AND status = 'in_progress'
        "#,
    )
    .bind(question_id)
    .fetch_one(pool)
    .await?;

    if live > 0 {
        return Err(AppError::Conflict(
            "Quiz has attempts in progress".to_string(),
        ));
    }

    Ok(())
}

async fn insert_question(
    pool: &PgPool,
    quiz_id: i64,
    payload: &CreateQuestionRequest,
) -> Result<Question, sqlx::Error> {
    sqlx::query_as::<_, Question>(
        r#"
        INSERT INTO questions (quiz_id, question_type, prompt, options,
                               correct_answer, points, explanation, position)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING id, quiz_id, question_type, prompt, options, correct_answer,
                  points, explanation, position, created_at
        "#,
    )
    .bind(quiz_id)
    .bind(payload.question_type)
    .bind(&payload.prompt)
    .bind(payload.options.as_ref().map(sqlx::types::Json))
    .bind(sqlx::types::Json(
        payload.correct_answer.clone().unwrap_or(Value::Null),
    ))
    .bind(payload.points)
    .bind(&payload.explanation)
    .bind(payload.position.unwrap_or(0))
    .fetch_one(pool)
    .await
}
