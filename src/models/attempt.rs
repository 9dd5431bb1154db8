// src/models/attempt.rs

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{prelude::FromRow, types::Json};

/// Attempt lifecycle states. Mirrors the Postgres enum 'attempt_status'.
/// 'submitted' and 'expired' are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "attempt_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    InProgress,
    Submitted,
    Expired,
}

impl AttemptStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, AttemptStatus::Submitted | AttemptStatus::Expired)
    }
}

/// Represents the 'quiz_attempts' table in the database.
/// One timed instance of a user taking a quiz.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct QuizAttempt {
    pub id: i64,
    pub user_id: i64,
    pub quiz_id: i64,

    /// 1-based, strictly increasing per user+quiz. Derived server-side.
    pub attempt_number: i32,

    pub status: AttemptStatus,

    pub started_at: DateTime<Utc>,

    /// NULL while the attempt is in progress.
    pub submitted_at: Option<DateTime<Utc>>,

    /// Submitted answers keyed by question id.
    pub answers: Json<HashMap<i64, Value>>,

    pub score: Option<i32>,
    pub max_score: Option<i32>,
    pub percentage: Option<i32>,
    pub is_passed: Option<bool>,
    pub time_spent_seconds: Option<i32>,

    /// Set when the quiz contains essay questions; the pass verdict is
    /// provisional until staff confirm the essay points.
    pub requires_manual_grading: bool,
}

/// DTO for submitting an attempt.
#[derive(Debug, Deserialize)]
pub struct SubmitAttemptRequest {
    pub attempt_id: i64,

    /// User's answers map. Key: question id. Value shape depends on the
    /// question type (string, bool, or string array).
    pub answers: HashMap<i64, Value>,
}

/// Query parameters for attempt lookup.
#[derive(Debug, Deserialize)]
pub struct AttemptQuery {
    pub attempt_id: Option<i64>,
}

/// Whole seconds elapsed since the attempt started, never negative.
pub fn elapsed_seconds(started_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - started_at).num_seconds().max(0)
}

/// True once the elapsed time has passed the quiz time limit.
/// A quiz without a limit never expires.
pub fn has_expired(
    started_at: DateTime<Utc>,
    time_limit_minutes: Option<i32>,
    now: DateTime<Utc>,
) -> bool {
    match time_limit_minutes {
        Some(limit) => elapsed_seconds(started_at, now) > i64::from(limit) * 60,
        None => false,
    }
}

/// Milliseconds left on the clock, clamped at zero. None when untimed.
pub fn time_remaining_ms(
    started_at: DateTime<Utc>,
    time_limit_minutes: Option<i32>,
    now: DateTime<Utc>,
) -> Option<i64> {
    time_limit_minutes.map(|limit| {
        let limit_ms = i64::from(limit) * 60_000;
        let elapsed_ms = (now - started_at).num_milliseconds().max(0);
        (limit_ms - elapsed_ms).max(0)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn t0() -> DateTime<Utc> {
        "2025-06-01T10:00:00Z".parse().unwrap()
    }

    #[test]
    fn test_elapsed_seconds() {
        let now = t0() + Duration::seconds(95);
        assert_eq!(elapsed_seconds(t0(), now), 95);
    }

    #[test]
    fn test_elapsed_never_negative() {
        let now = t0() - Duration::seconds(5);
        assert_eq!(elapsed_seconds(t0(), now), 0);
    }

    #[test]
    fn test_no_limit_never_expires() {
        let now = t0() + Duration::days(30);
        assert!(!has_expired(t0(), None, now));
        assert_eq!(time_remaining_ms(t0(), None, now), None);
    }

    #[test]
    fn test_expiry_boundary() {
        // Exactly at the limit is still valid; one second past is not.
        let limit = Some(10);
        assert!(!has_expired(t0(), limit, t0() + Duration::minutes(10)));
        assert!(has_expired(
            t0(),
            limit,
            t0() + Duration::minutes(10) + Duration::seconds(1)
        ));
    }

    #[test]
    fn test_time_remaining() {
        let now = t0() + Duration::minutes(4);
        assert_eq!(time_remaining_ms(t0(), Some(10), now), Some(6 * 60_000));
    }

    #[test]
    fn test_time_remaining_clamped_at_zero() {
        let now = t0() + Duration::minutes(11);
        assert_eq!(time_remaining_ms(t0(), Some(10), now), Some(0));
    }
}
