// src/grading.rs

use std::collections::{BTreeSet, HashMap};

use serde::Serialize;
use serde_json::Value;

use crate::models::quiz::{Question, QuestionType};

/// Outcome of grading a single question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerVerdict {
    Correct,
    Incorrect,
    /// Essay answer awaiting staff grading; contributes 0 to the
    /// automatic score.
    PendingManual,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuestionResult {
    pub question_id: i64,
    pub verdict: AnswerVerdict,
    pub points_awarded: i32,
    pub points_possible: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GradeSummary {
    pub score: i32,
    pub max_score: i32,
    pub percentage: i32,
    pub is_passed: bool,
    /// True while any essay answer still awaits staff points.
    pub pending_manual: bool,
    pub results: Vec<QuestionResult>,
}

/// Grades a full answer set against the quiz questions.
///
/// Pure and deterministic: identical inputs always produce identical
/// output, which is what makes re-grading and audit possible. `manual_points`
/// carries staff-awarded essay points (empty on first submission); awards
/// are clamped to the question's point value.
pub fn grade(
    questions: &[Question],
    answers: &HashMap<i64, Value>,
    manual_points: &HashMap<i64, i32>,
    passing_score: i32,
) -> GradeSummary {
    let mut score: i32 = 0;
    let mut max_score: i32 = 0;
    let mut pending_manual = false;
    let mut results = Vec::with_capacity(questions.len());

    for question in questions {
        max_score += question.points;

        let (verdict, awarded) = grade_question(
            question,
            answers.get(&question.id),
            manual_points.get(&question.id).copied(),
        );

        score += awarded;
        if verdict == AnswerVerdict::PendingManual {
            pending_manual = true;
        }

        results.push(QuestionResult {
            question_id: question.id,
            verdict,
            points_awarded: awarded,
            points_possible: question.points,
            explanation: question.explanation.clone(),
        });
    }

    let percentage = percentage_of(score, max_score);

    GradeSummary {
        score,
        max_score,
        percentage,
        is_passed: percentage >= passing_score,
        pending_manual,
        results,
    }
}

/// Grades one question. Returns the verdict and the points awarded.
fn grade_question(
    question: &Question,
    submitted: Option<&Value>,
    manual: Option<i32>,
) -> (AnswerVerdict, i32) {
    if question.question_type == QuestionType::Essay {
        // Staff points finalize an essay; until then a submitted answer
        // is pending and an unanswered one is simply wrong.
        return match (manual, submitted) {
            (Some(points), _) => {
                let awarded = points.clamp(0, question.points);
                if awarded > 0 {
                    (AnswerVerdict::Correct, awarded)
                } else {
                    (AnswerVerdict::Incorrect, 0)
                }
            }
            (None, Some(_)) => (AnswerVerdict::PendingManual, 0),
            (None, None) => (AnswerVerdict::Incorrect, 0),
        };
    }

    let Some(submitted) = submitted else {
        return (AnswerVerdict::Incorrect, 0);
    };

    let correct = match question.question_type {
        QuestionType::MultipleChoice | QuestionType::TrueFalse => {
            submitted == &question.correct_answer.0
        }
        QuestionType::MultipleSelect => {
            sets_equal(submitted, &question.correct_answer.0)
        }
        QuestionType::ShortAnswer => {
            normalized_text_equal(submitted, &question.correct_answer.0)
        }
        QuestionType::Essay => unreachable!("handled above"),
    };

    if correct {
        (AnswerVerdict::Correct, question.points)
    } else {
        (AnswerVerdict::Incorrect, 0)
    }
}

/// Order-independent comparison of two JSON string arrays.
fn sets_equal(submitted: &Value, correct: &Value) -> bool {
    match (as_string_set(submitted), as_string_set(correct)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

fn as_string_set(value: &Value) -> Option<BTreeSet<&str>> {
    value
        .as_array()?
        .iter()
        .map(|v| v.as_str())
        .collect::<Option<BTreeSet<&str>>>()
}

/// Case-insensitive, whitespace-trimmed string equality.
fn normalized_text_equal(submitted: &Value, correct: &Value) -> bool {
    match (submitted.as_str(), correct.as_str()) {
        (Some(a), Some(b)) => a.trim().to_lowercase() == b.trim().to_lowercase(),
        _ => false,
    }
}

/// Integer percentage, round-half-up. Zero max score yields zero.
pub fn percentage_of(score: i32, max_score: i32) -> i32 {
    if max_score <= 0 {
        return 0;
    }
    let score = i64::from(score.max(0));
    let max = i64::from(max_score);
    ((score * 200 + max) / (2 * max)) as i32
}
