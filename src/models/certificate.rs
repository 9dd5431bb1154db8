// src/models/certificate.rs

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Represents the 'certificates' table in the database.
/// At most one per user+course; issuance is idempotent.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Certificate {
    pub id: i64,
    pub user_id: i64,
    pub course_id: i64,
    pub certificate_number: String,
    pub issued_at: chrono::DateTime<chrono::Utc>,
}

/// Certificate joined with its course for profile listings.
#[derive(Debug, Serialize, FromRow)]
pub struct CertificateSummary {
    pub course_id: i64,
    pub course_title: String,
    pub certificate_number: String,
    pub issued_at: chrono::DateTime<chrono::Utc>,
}
