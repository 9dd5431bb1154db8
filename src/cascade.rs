// src/cascade.rs
//
// Completion cascade: a passing, finalized quiz attempt marks its lesson
// complete, recomputes course progress, and on the ACTIVE -> COMPLETED
// enrollment transition issues the certificate and completion badge.
// Every step is best-effort: a failure is logged and never propagated to
// the grading response, and nothing is rolled back.

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::{CERTIFICATE_PREFIX, COMPLETION_BADGE_CODE};
use crate::grading::percentage_of;

/// Runs the full cascade for a passed attempt on `lesson_id`.
pub async fn run(pool: &PgPool, user_id: i64, lesson_id: i64, course_id: i64) {
    if let Err(e) = mark_lesson_completed(pool, user_id, lesson_id).await {
        tracing::error!(
            "Cascade: failed to mark lesson {} complete for user {}: {:?}",
            lesson_id,
            user_id,
            e
        );
    }

    let transitioned = match recompute_course_completion(pool, user_id, course_id).await {
        Ok(t) => t,
        Err(e) => {
            tracing::error!(
                "Cascade: failed to recompute course {} completion for user {}: {:?}",
                course_id,
                user_id,
                e
            );
            return;
        }
    };

    if !transitioned {
        return;
    }

    if let Err(e) = issue_certificate(pool, user_id, course_id).await {
        tracing::error!(
            "Cascade: certificate issuance failed for user {} course {}: {:?}",
            user_id,
            course_id,
            e
        );
    }

    if let Err(e) = award_completion_badge(pool, user_id).await {
        tracing::error!(
            "Cascade: badge award failed for user {}: {:?}",
            user_id,
            e
        );
    }
}

/// Upserts the lesson progress row. An earlier completed_at is preserved;
/// the unique (user_id, lesson_id) constraint makes this safe under
/// concurrent submissions.
async fn mark_lesson_completed(
    pool: &PgPool,
    user_id: i64,
    lesson_id: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO lesson_progress (user_id, lesson_id, is_completed, completed_at)
        VALUES ($1, $2, TRUE, NOW())
        ON CONFLICT (user_id, lesson_id) DO UPDATE SET
            is_completed = TRUE,
            completed_at = COALESCE(lesson_progress.completed_at, EXCLUDED.completed_at)
        "#,
    )
    .bind(user_id)
    .bind(lesson_id)
    .execute(pool)
    .await?;

    Ok(())
}

/// Recomputes course progress from the published-lesson counts (never
/// incrementally drifted). Returns true when this call performed the
/// ACTIVE -> COMPLETED transition; the status-guarded UPDATE ensures the
/// transition is observed by exactly one caller.
async fn recompute_course_completion(
    pool: &PgPool,
    user_id: i64,
    course_id: i64,
) -> Result<bool, sqlx::Error> {
    let (completed, total): (i64, i64) = sqlx::query_as(
        r#"
        SELECT
            COUNT(*) FILTER (WHERE lp.is_completed) AS completed,
            COUNT(*) AS total
        FROM lessons l
        LEFT JOIN lesson_progress lp
            ON lp.lesson_id = l.id AND lp.user_id = $1
        WHERE l.course_id = $2 AND l.is_published
        "#,
    )
    .bind(user_id)
    .bind(course_id)
    .fetch_one(pool)
    .await?;

    if total > 0 && completed == total {
        let result = sqlx::query(
            r#"
            UPDATE enrollments
            SET status = 'completed', progress = 100, completed_at = NOW()
            WHERE user_id = $1 AND course_id = $2 AND status = 'active'
            "#,
        )
        .bind(user_id)
        .bind(course_id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() == 1)
    } else {
        let progress = percentage_of(completed as i32, total as i32);

        sqlx::query(
            r#"
            UPDATE enrollments
            SET progress = $3
            WHERE user_id = $1 AND course_id = $2 AND status = 'active'
            "#,
        )
        .bind(user_id)
        .bind(course_id)
        .bind(progress)
        .execute(pool)
        .await?;

        Ok(false)
    }
}

/// Inserts the certificate if none exists for this user+course.
async fn issue_certificate(pool: &PgPool, user_id: i64, course_id: i64) -> Result<(), sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO certificates (user_id, course_id, certificate_number)
        VALUES ($1, $2, $3)
        ON CONFLICT (user_id, course_id) DO NOTHING
        "#,
    )
    .bind(user_id)
    .bind(course_id)
    .bind(generate_certificate_number())
    .execute(pool)
    .await?;

    if result.rows_affected() == 1 {
        tracing::info!(
            "Issued certificate for user {} on course {}",
            user_id,
            course_id
        );
    }

    Ok(())
}

/// Awards the course-completion badge if the user does not hold it yet.
/// A missing catalog entry results in zero rows, not an error.
async fn award_completion_badge(pool: &PgPool, user_id: i64) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO user_badges (user_id, badge_id)
        SELECT $1, id FROM badges WHERE code = $2
        ON CONFLICT (user_id, badge_id) DO NOTHING
        "#,
    )
    .bind(user_id)
    .bind(COMPLETION_BADGE_CODE)
    .execute(pool)
    .await?;

    Ok(())
}

/// Generates a unique certificate number, e.g. "CERT-202506-9F2C41A07B3D".
pub fn generate_certificate_number() -> String {
    let stamp = Utc::now().format("%Y%m");
    let token = Uuid::new_v4().simple().to_string();
    format!(
        "{}-{}-{}",
        CERTIFICATE_PREFIX,
        stamp,
        token[..12].to_uppercase()
    )
}
