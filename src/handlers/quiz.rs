// src/handlers/quiz.rs

use std::collections::HashMap;

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use chrono::Utc;
use serde_json::json;
use sqlx::{PgPool, types::Json as SqlJson};

use crate::{
    cascade,
    error::{AppError, is_unique_violation},
    grading,
    models::{
        attempt::{self, AttemptQuery, QuizAttempt, SubmitAttemptRequest},
        quiz::{PublicQuestion, Question, QuizContext},
    },
    utils::jwt::Claims,
};

const ATTEMPT_COLUMNS: &str = "id, user_id, quiz_id, attempt_number, status, started_at, \
     submitted_at, answers, score, max_score, percentage, is_passed, \
     time_spent_seconds, requires_manual_grading";

/// Starts a new attempt or resumes the live one.
///
/// * Resuming is idempotent: while an unexpired in-progress attempt
///   exists, every start call returns the same attempt.
/// * A stale in-progress attempt past its time limit is expired in place
///   (zero score, not passed) before a fresh attempt is created.
/// * attempt_number is always derived server-side from the terminal
///   attempt count; clients never supply it.
pub async fn start_attempt(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(quiz_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.sub.parse::<i64>().unwrap_or(0);
    let quiz = fetch_quiz_context(&pool, quiz_id).await?;
    ensure_can_attempt(&pool, user_id, &quiz).await?;

    let now = Utc::now();

    if let Some(existing) = fetch_in_progress(&pool, user_id, quiz_id).await? {
        if !attempt::has_expired(existing.started_at, quiz.time_limit_minutes, now) {
            let questions = fetch_questions_for_delivery(&pool, &quiz).await?;
            return Ok(Json(json!({
                "attempt": existing,
                "questions": questions,
                "time_remaining_ms":
                    attempt::time_remaining_ms(existing.started_at, quiz.time_limit_minutes, now),
            })));
        }

        expire_attempt(&pool, &existing, &quiz).await?;
    }

    let terminal_count = sqlx::query_scalar::<_, i64>(
        r#"
        SELECT COUNT(*) FROM quiz_attempts
        WHERE user_id = $1 AND quiz_id = $2 AND status <> 'in_progress'
        "#,
    )
    .bind(user_id)
    .bind(quiz_id)
    .fetch_one(&pool)
    .await?;

    if let Some(max) = quiz.max_attempts
        && terminal_count >= i64::from(max)
    {
        return Err(AppError::BadRequest("Maximum attempts exceeded".to_string()));
    }

    let new_attempt = sqlx::query_as::<_, QuizAttempt>(&format!(
        r#"
        INSERT INTO quiz_attempts (user_id, quiz_id, attempt_number)
        VALUES ($1, $2, $3)
        RETURNING {ATTEMPT_COLUMNS}
        "#,
    ))
    .bind(user_id)
    .bind(quiz_id)
    .bind((terminal_count + 1) as i32)
    .fetch_one(&pool)
    .await
    .map_err(|e| {
        // A concurrent start already created the live attempt; the partial
        // unique index rejects this one.
        if is_unique_violation(&e) {
            AppError::Conflict("An attempt is already in progress".to_string())
        } else {
            tracing::error!("Failed to create attempt: {:?}", e);
            AppError::from(e)
        }
    })?;

    let questions = fetch_questions_for_delivery(&pool, &quiz).await?;

    Ok(Json(json!({
        "attempt": new_attempt,
        "questions": questions,
        "time_remaining_ms":
            attempt::time_remaining_ms(new_attempt.started_at, quiz.time_limit_minutes, now),
    })))
}

/// Submits an in-progress attempt and grades it.
///
/// A submission past the time limit is refused; the stale attempt is
/// expired by the next start call instead. The grade is persisted with a
/// status-guarded UPDATE so a concurrent double-submit loses cleanly.
pub async fn submit_attempt(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(quiz_id): Path<i64>,
    Json(req): Json<SubmitAttemptRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.sub.parse::<i64>().unwrap_or(0);
    let quiz = fetch_quiz_context(&pool, quiz_id).await?;

    // Re-checked at submit time: the learner could have lost access
    // since the attempt started.
    ensure_can_attempt(&pool, user_id, &quiz).await?;

    let current = sqlx::query_as::<_, QuizAttempt>(&format!(
        r#"
        SELECT {ATTEMPT_COLUMNS}
        FROM quiz_attempts
        WHERE id = $1 AND quiz_id = $2 AND user_id = $3
        "#,
    ))
    .bind(req.attempt_id)
    .bind(quiz_id)
    .bind(user_id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Attempt not found".to_string()))?;

    if current.status.is_terminal() {
        return Err(AppError::BadRequest("Attempt already submitted".to_string()));
    }

    let now = Utc::now();
    if attempt::has_expired(current.started_at, quiz.time_limit_minutes, now) {
        return Err(AppError::BadRequest("Time limit exceeded".to_string()));
    }

    let questions = fetch_questions(&pool, quiz_id).await?;
    let summary = grading::grade(&questions, &req.answers, &HashMap::new(), quiz.passing_score);
    let time_spent = attempt::elapsed_seconds(current.started_at, now) as i32;

    let updated = sqlx::query_as::<_, QuizAttempt>(&format!(
        r#"
        UPDATE quiz_attempts
        SET status = 'submitted',
            submitted_at = $2,
            answers = $3,
            score = $4,
            max_score = $5,
            percentage = $6,
            is_passed = $7,
            time_spent_seconds = $8,
            requires_manual_grading = $9
        WHERE id = $1 AND status = 'in_progress'
        RETURNING {ATTEMPT_COLUMNS}
        "#,
    ))
    .bind(req.attempt_id)
    .bind(now)
    .bind(SqlJson(&req.answers))
    .bind(summary.score)
    .bind(summary.max_score)
    .bind(summary.percentage)
    .bind(summary.is_passed)
    .bind(time_spent)
    .bind(summary.pending_manual)
    .fetch_optional(&pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to persist graded attempt: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?
    .ok_or(AppError::BadRequest("Attempt already submitted".to_string()))?;

    // The cascade fires only on a finalized pass. With essays pending the
    // verdict stays provisional until staff confirm the points. Failures
    // inside the cascade are logged there and never fail this response.
    if summary.is_passed && !summary.pending_manual {
        cascade::run(&pool, user_id, quiz.lesson_id, quiz.course_id).await;
    }

    let mut results = json!({
        "score": summary.score,
        "max_score": summary.max_score,
        "percentage": summary.percentage,
        "passed": summary.is_passed,
        "pending_manual_grading": summary.pending_manual,
        "total_questions": questions.len(),
        "time_spent_seconds": time_spent,
    });
    if quiz.show_results_immediately {
        results["details"] = serde_json::to_value(&summary.results)?;
    }

    Ok(Json(json!({
        "attempt": updated,
        "results": results,
    })))
}

/// Returns one attempt (by id) or the caller's full attempt history for
/// the quiz.
pub async fn get_attempts(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
    Path(quiz_id): Path<i64>,
    Query(params): Query<AttemptQuery>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.sub.parse::<i64>().unwrap_or(0);

    if let Some(attempt_id) = params.attempt_id {
        let found = sqlx::query_as::<_, QuizAttempt>(&format!(
            r#"
            SELECT {ATTEMPT_COLUMNS}
            FROM quiz_attempts
            WHERE id = $1 AND quiz_id = $2 AND user_id = $3
            "#,
        ))
        .bind(attempt_id)
        .bind(quiz_id)
        .bind(user_id)
        .fetch_optional(&pool)
        .await?
        .ok_or(AppError::NotFound("Attempt not found".to_string()))?;

        return Ok(Json(json!(found)));
    }

    let history = sqlx::query_as::<_, QuizAttempt>(&format!(
        r#"
        SELECT {ATTEMPT_COLUMNS}
        FROM quiz_attempts
        WHERE quiz_id = $1 AND user_id = $2
        ORDER BY attempt_number DESC
        "#,
    ))
    .bind(quiz_id)
    .bind(user_id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(json!(history)))
}

/// Loads the quiz joined with its lesson/course context. Only quizzes on
/// published lessons are reachable.
async fn fetch_quiz_context(pool: &PgPool, quiz_id: i64) -> Result<QuizContext, AppError> {
    sqlx::query_as::<_, QuizContext>(
        r#"
        SELECT
            q.id, q.lesson_id, l.course_id, l.is_free AS lesson_is_free,
            q.title, q.passing_score, q.max_attempts, q.time_limit_minutes,
            q.randomize_questions, q.show_results_immediately
        FROM quizzes q
        JOIN lessons l ON l.id = q.lesson_id
        WHERE q.id = $1 AND l.is_published
        "#,
    )
    .bind(quiz_id)
    .fetch_optional(pool)
    .await?
    .ok_or(AppError::NotFound("Quiz not found".to_string()))
}

/// Access gate: enrollment in the quiz's course, or a free lesson.
/// Side-effect free; called at both attempt start and submit.
async fn ensure_can_attempt(
    pool: &PgPool,
    user_id: i64,
    quiz: &QuizContext,
) -> Result<(), AppError> {
    if quiz.lesson_is_free {
        return Ok(());
    }

    let enrolled = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM enrollments WHERE user_id = $1 AND course_id = $2",
    )
    .bind(user_id)
    .bind(quiz.course_id)
    .fetch_one(pool)
    .await?;

    if enrolled == 0 {
        return Err(AppError::Forbidden("Enrollment required".to_string()));
    }

    Ok(())
}

async fn fetch_in_progress(
    pool: &PgPool,
    user_id: i64,
    quiz_id: i64,
) -> Result<Option<QuizAttempt>, AppError> {
    let found = sqlx::query_as::<_, QuizAttempt>(&format!(
        r#"
        SELECT {ATTEMPT_COLUMNS}
        FROM quiz_attempts
        WHERE user_id = $1 AND quiz_id = $2 AND status = 'in_progress'
        "#,
    ))
    .bind(user_id)
    .bind(quiz_id)
    .fetch_optional(pool)
    .await?;

    Ok(found)
}

/// Expires a stale in-progress attempt: forced zero score, not passed,
/// time spent pinned to the limit. Status-guarded so a concurrent call
/// touching the same attempt settles it exactly once.
async fn expire_attempt(
    pool: &PgPool,
    stale: &QuizAttempt,
    quiz: &QuizContext,
) -> Result<(), AppError> {
    let limit_seconds = quiz.time_limit_minutes.unwrap_or(0) * 60;

    sqlx::query(
        r#"
        UPDATE quiz_attempts
        SET status = 'expired',
            submitted_at = NOW(),
            score = 0,
            max_score = (SELECT COALESCE(SUM(points), 0)::INT FROM questions WHERE quiz_id = $2),
            percentage = 0,
            is_passed = FALSE,
            time_spent_seconds = $3
        WHERE id = $1 AND status = 'in_progress'
        "#,
    )
    .bind(stale.id)
    .bind(quiz.id)
    .bind(limit_seconds)
    .execute(pool)
    .await?;

    tracing::info!(
        "Expired stale attempt {} (user {}, quiz {})",
        stale.id,
        stale.user_id,
        quiz.id
    );

    Ok(())
}

async fn fetch_questions(pool: &PgPool, quiz_id: i64) -> Result<Vec<Question>, AppError> {
    let questions = sqlx::query_as::<_, Question>(
        r#"
        SELECT id, quiz_id, question_type, prompt, options, correct_answer,
               points, explanation, position, created_at
        FROM questions
        WHERE quiz_id = $1
        ORDER BY position, id
        "#,
    )
    .bind(quiz_id)
    .fetch_all(pool)
    .await?;

    Ok(questions)
}

/// Questions as delivered to the learner: answers and explanations
/// stripped, randomized per delivery when the quiz asks for it. The
/// order is not persisted; grading matches by question id.
async fn fetch_questions_for_delivery(
    pool: &PgPool,
    quiz: &QuizContext,
) -> Result<Vec<PublicQuestion>, AppError> {
    let order = if quiz.randomize_questions {
        "RANDOM()"
    } else {
        "position, id"
    };

    let questions = sqlx::query_as::<_, Question>(&format!(
        r#"
        SELECT id, quiz_id, question_type, prompt, options, correct_answer,
               points, explanation, position, created_at
        FROM questions
        WHERE quiz_id = $1
        ORDER BY {order}
        "#,
    ))
    .bind(quiz.id)
    .fetch_all(pool)
    .await
    .map_err(|e| {
        tracing::error!("Failed to fetch quiz questions: {:?}", e);
        AppError::InternalServerError(e.to_string())
    })?;

    Ok(questions.into_iter().map(PublicQuestion::from).collect())
}
