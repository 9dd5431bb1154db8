// src/models/quiz.rs

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::{prelude::FromRow, types::Json};
use validator::Validate;

/// Closed set of question kinds. Mirrors the Postgres enum 'question_type'.
/// Grading is exhaustive over this enum; adding a variant will not compile
/// until every grading path handles it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Serialize, Deserialize)]
#[sqlx(type_name = "question_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    MultipleChoice,
    TrueFalse,
    MultipleSelect,
    ShortAnswer,
    Essay,
}

impl QuestionType {
    /// Choice-based types must carry an options list.
    pub fn requires_options(self) -> bool {
        matches!(
            self,
            QuestionType::MultipleChoice | QuestionType::TrueFalse | QuestionType::MultipleSelect
        )
    }
}

/// Represents the 'quizzes' table in the database.
/// One quiz per lesson; immutable while an attempt is live.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Quiz {
    pub id: i64,

    pub lesson_id: i64,

    pub title: String,

    /// Minimum percentage (0-100) required to pass. Inclusive.
    pub passing_score: i32,

    /// Maximum number of attempts. NULL means unlimited.
    pub max_attempts: Option<i32>,

    /// Optional time limit. Expiry is detected lazily on the next read.
    pub time_limit_minutes: Option<i32>,

    /// Deliver questions in a fresh random order per start/resume.
    pub randomize_questions: bool,

    /// Include per-question details in the submit response.
    pub show_results_immediately: bool,

    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Quiz joined with its lesson's course context.
/// Internal row used by the access gate and attempt lifecycle.
#[derive(Debug, Clone, FromRow)]
pub struct QuizContext {
    pub id: i64,
    pub lesson_id: i64,
    pub course_id: i64,
    pub lesson_is_free: bool,
    pub title: String,
    pub passing_score: i32,
    pub max_attempts: Option<i32>,
    pub time_limit_minutes: Option<i32>,
    pub randomize_questions: bool,
    pub show_results_immediately: bool,
}

/// Represents the 'questions' table in the database.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Question {
    pub id: i64,

    pub quiz_id: i64,

    pub question_type: QuestionType,

    pub prompt: String,

    /// Options for choice-based questions, stored as a JSON array.
    pub options: Option<Json<Vec<String>>>,

    /// Correct answer; shape depends on `question_type`:
    /// string for multiple_choice/short_answer, bool for true_false,
    /// string array for multiple_select, null for essay.
    pub correct_answer: Json<Value>,

    pub points: i32,

    /// Shown post-submission only when the quiz allows immediate results.
    pub explanation: Option<String>,

    pub position: i32,

    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// DTO for sending a question to a learner (excludes answer and explanation).
#[derive(Debug, Serialize)]
pub struct PublicQuestion {
    pub id: i64,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    pub prompt: String,
    pub options: Option<Json<Vec<String>>>,
    pub points: i32,
}

impl From<Question> for PublicQuestion {
    fn from(q: Question) -> Self {
        PublicQuestion {
            id: q.id,
            question_type: q.question_type,
            prompt: q.prompt,
            options: q.options,
            points: q.points,
        }
    }
}

/// DTO for creating a quiz under a lesson.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateQuizRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(range(min = 0, max = 100))]
    pub passing_score: i32,
    #[validate(range(min = 1))]
    pub max_attempts: Option<i32>,
    #[validate(range(min = 1))]
    pub time_limit_minutes: Option<i32>,
    pub randomize_questions: Option<bool>,
    pub show_results_immediately: Option<bool>,
}

/// DTO for creating or updating a question.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateQuestionRequest {
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    #[validate(length(min = 1, max = 2000))]
    pub prompt: String,
    pub options: Option<Vec<String>>,
    /// Shape checked against `question_type` by `validate_shape`.
    pub correct_answer: Option<Value>,
    #[validate(range(min = 1))]
    pub points: i32,
    #[validate(length(max = 2000))]
    pub explanation: Option<String>,
    #[validate(range(min = 0))]
    pub position: Option<i32>,
}

impl CreateQuestionRequest {
    /// Cross-field validation: options presence and correct_answer shape
    /// must agree with the question type.
    pub fn validate_shape(&self) -> Result<(), String> {
        let options = self.options.as_deref().unwrap_or(&[]);

        if self.question_type.requires_options() && options.is_empty() {
            return Err("Options are required for choice questions".to_string());
        }

        match self.question_type {
            QuestionType::MultipleChoice => match &self.correct_answer {
                Some(Value::String(s)) if options.iter().any(|o| o == s) => Ok(()),
                _ => Err("Correct answer must be one of the options".to_string()),
            },
            QuestionType::TrueFalse => match &self.correct_answer {
                Some(Value::Bool(_)) => Ok(()),
                _ => Err("Correct answer must be true or false".to_string()),
            },
            QuestionType::MultipleSelect => match &self.correct_answer {
                Some(Value::Array(items))
                    if !items.is_empty()
                        && items.iter().all(|v| {
                            v.as_str().is_some_and(|s| options.iter().any(|o| o == s))
                        }) =>
                {
                    Ok(())
                }
                _ => Err("Correct answer must be a non-empty subset of the options".to_string()),
            },
            QuestionType::ShortAnswer => match &self.correct_answer {
                Some(Value::String(s)) if !s.trim().is_empty() => Ok(()),
                _ => Err("Correct answer must be a non-empty string".to_string()),
            },
            // Essays are graded manually; a reference answer is not stored.
            QuestionType::Essay => match &self.correct_answer {
                None | Some(Value::Null) => Ok(()),
                _ => Err("Essay questions must not carry a correct answer".to_string()),
            },
        }
    }
}
