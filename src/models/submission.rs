use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A student submission from the `submissions` collection. Deserialization is
/// deliberately lenient: historical documents are missing fields, and those
/// records must still load so the evaluator can classify them.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub id: String,
    pub test_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrollment_no: Option<String>,
    #[serde(default)]
    pub answers: Vec<Answer>,
    #[serde(default)]
    pub score: i32,
    #[serde(default)]
    pub total_questions: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_draft: bool,
    #[serde(default)]
    pub is_completed: bool,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    pub question_id: String,
    /// 1-based position of the question in the exam's original order. The
    /// reliable fallback key when `question_id` is orphaned.
    #[serde(default)]
    pub original_question_number: i32,
    /// Index the student clicked, in the shuffled option order they saw.
    /// Serialized even when null: answers are written back wholesale and the
    /// stored shape must not change.
    #[serde(default)]
    pub selected_answer: Option<i32>,
    /// Position p holds the original-order index of the option displayed at
    /// shuffled position p. Empty means shuffling was not recorded.
    #[serde(default)]
    pub shuffled_to_original: Vec<i32>,
    #[serde(default)]
    pub is_correct: bool,
}

impl Submission {
    /// Count of answers currently marked correct; the stored `score` must
    /// equal this after reconciliation.
    pub fn correct_count(&self) -> i32 {
        self.answers.iter().filter(|a| a.is_correct).count() as i32
    }

    /// Detects the known corruption where answers repeat the same
    /// `originalQuestionNumber` (e.g. an entire submission reporting `1`).
    /// Such records cannot be trusted for number-based question resolution.
    pub fn has_duplicate_question_numbers(&self) -> bool {
        let mut seen = HashSet::new();
        self.answers
            .iter()
            .any(|a| !seen.insert(a.original_question_number))
    }
}
