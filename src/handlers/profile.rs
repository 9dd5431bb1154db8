// src/handlers/profile.rs

use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use sqlx::PgPool;

use crate::{
    error::AppError,
    models::{
        badge::AwardedBadge,
        certificate::{Certificate, CertificateSummary},
        enrollment::EnrollmentSummary,
        user::MeResponse,
    },
    utils::jwt::Claims,
};

/// Get current user's profile and learning statistics.
pub async fn get_me(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.sub.parse::<i64>().unwrap_or(0);

    // Subquery counts keep this a single round trip.
    let me = sqlx::query_as::<_, MeResponse>(
        r#"
        SELECT
            u.id, u.username, u.role, u.created_at,
            (SELECT COUNT(*) FROM enrollments WHERE user_id = u.id) AS enrollments_count,
            (SELECT COUNT(*) FROM certificates WHERE user_id = u.id) AS certificates_count,
            (SELECT COUNT(*) FROM user_badges WHERE user_id = u.id) AS badges_count
        FROM users u
        WHERE u.id = $1
        "#,
    )
    .bind(user_id)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("User not found".to_string()))?;

    Ok(Json(me))
}

/// List the current user's enrollments with course titles.
pub async fn list_my_enrollments(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.sub.parse::<i64>().unwrap_or(0);

    let enrollments = sqlx::query_as::<_, EnrollmentSummary>(
        r#"
        SELECT
            e.course_id, c.title AS course_title, e.status, e.progress,
            e.enrolled_at, e.completed_at
        FROM enrollments e
        JOIN courses c ON e.course_id = c.id
        WHERE e.user_id = $1
        ORDER BY e.enrolled_at DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(enrollments))
}

/// List certificates earned by the current user.
pub async fn list_my_certificates(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.sub.parse::<i64>().unwrap_or(0);

    let certificates = sqlx::query_as::<_, CertificateSummary>(
        r#"
        SELECT
            ct.course_id, c.title AS course_title,
            ct.certificate_number, ct.issued_at
        FROM certificates ct
        JOIN courses c ON ct.course_id = c.id
        WHERE ct.user_id = $1
        ORDER BY ct.issued_at DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(certificates))
}

/// List badges awarded to the current user.
pub async fn list_my_badges(
    State(pool): State<PgPool>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, AppError> {
    let user_id = claims.sub.parse::<i64>().unwrap_or(0);

    let badges = sqlx::query_as::<_, AwardedBadge>(
        r#"
        SELECT b.code, b.name, b.description, ub.awarded_at
        FROM user_badges ub
        JOIN badges b ON ub.badge_id = b.id
        WHERE ub.user_id = $1
        ORDER BY ub.awarded_at DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(&pool)
    .await?;

    Ok(Json(badges))
}

/// Public certificate verification by number. No authentication: the
/// certificate number itself is the capability.
pub async fn verify_certificate(
    State(pool): State<PgPool>,
    Path(certificate_number): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let certificate = sqlx::query_as::<_, Certificate>(
        r#"
        SELECT id, user_id, course_id, certificate_number, issued_at
        FROM certificates
        WHERE certificate_number = $1
        "#,
    )
    .bind(&certificate_number)
    .fetch_optional(&pool)
    .await?
    .ok_or(AppError::NotFound("Certificate not found".to_string()))?;

    Ok(Json(certificate))
}
