//! Answer correctness evaluation.
//!
//! This is the single source of truth for the correctness rule. Several
//! maintenance paths (reconciliation, exports, spot checks) previously
//! re-derived `isCorrect` independently and disagreed on the no-shuffle and
//! orphaned-question cases; every caller now routes through [`evaluate`].
//!
//! Pure functions only: no I/O, deterministic, never panics.

use std::fmt;

use crate::models::exam::{Exam, Question, OPTION_COUNT};
use crate::models::submission::Answer;

/// Outcome of evaluating one answer against its question.
///
/// `is_correct` and `malformed` are independent: an answer scored through the
/// no-shuffle fallback can be correct and still flagged, because the missing
/// shuffle map is a data-integrity finding the caller must log apart from a
/// genuine wrong answer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Evaluation {
    pub is_correct: bool,
    pub malformed: bool,
    pub reason: Option<MalformedReason>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MalformedReason {
    SelectedAnswerOutOfRange,
    MissingShuffleMap,
    InvalidShuffleMap,
    QuestionNotFound,
    InvalidCorrectAnswerIndex,
}

impl fmt::Display for MalformedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            MalformedReason::SelectedAnswerOutOfRange => "selectedAnswer out of range or missing",
            MalformedReason::MissingShuffleMap => "missing shuffle map",
            MalformedReason::InvalidShuffleMap => "invalid shuffle map",
            MalformedReason::QuestionNotFound => "question not found",
            MalformedReason::InvalidCorrectAnswerIndex => "invalid correctAnswerIndex",
        };
        f.write_str(text)
    }
}

impl Evaluation {
    fn correct() -> Self {
        Self {
            is_correct: true,
            malformed: false,
            reason: None,
        }
    }

    fn incorrect() -> Self {
        Self {
            is_correct: false,
            malformed: false,
            reason: None,
        }
    }

    fn malformed(is_correct: bool, reason: MalformedReason) -> Self {
        Self {
            is_correct,
            malformed: true,
            reason: Some(reason),
        }
    }
}

/// Resolves the question an answer refers to.
///
/// Matches by `questionId` first. Historical data contains answers whose
/// `questionId` resolves to nothing in the owning exam, so
/// `originalQuestionNumber` (1-based position) is the fallback key.
pub fn resolve_question<'a>(exam: &'a Exam, answer: &Answer) -> Option<&'a Question> {
    exam.question_by_id(&answer.question_id)
        .or_else(|| exam.question_by_number(answer.original_question_number))
}

/// Decides whether one answer is correct, classifying malformed input along
/// the way.
///
/// Rules, in order:
/// 1. Unresolved question: incorrect, `question not found`.
/// 2. `correctAnswerIndex` null or outside [0,3]: incorrect,
///    `invalid correctAnswerIndex` (question-level defect, never a crash).
/// 3. `selectedAnswer` null or outside [0,3]: incorrect,
///    `selectedAnswer out of range or missing`.
/// 4. Missing/empty shuffle map: compare `selectedAnswer` directly in
///    original-order space, flagged `missing shuffle map`.
/// 5. Non-empty map that is not a permutation of {0,1,2,3}: incorrect,
///    `invalid shuffle map`.
/// 6. Valid map: correct iff `shuffledToOriginal[selectedAnswer]` equals
///    `correctAnswerIndex`.
pub fn evaluate(answer: &Answer, question: Option<&Question>) -> Evaluation {
    let Some(question) = question else {
        return Evaluation::malformed(false, MalformedReason::QuestionNotFound);
    };

    let Some(correct_index) = question.valid_correct_index() else {
        return Evaluation::malformed(false, MalformedReason::InvalidCorrectAnswerIndex);
    };

    let Some(selected) = answer.selected_answer else {
        return Evaluation::malformed(false, MalformedReason::SelectedAnswerOutOfRange);
    };
    if !(0..OPTION_COUNT as i32).contains(&selected) {
        return Evaluation::malformed(false, MalformedReason::SelectedAnswerOutOfRange);
    }

    if answer.shuffled_to_original.is_empty() {
        let is_correct = selected == correct_index;
        return Evaluation::malformed(is_correct, MalformedReason::MissingShuffleMap);
    }

    if !is_permutation(&answer.shuffled_to_original) {
        return Evaluation::malformed(false, MalformedReason::InvalidShuffleMap);
    }

    let original_index = answer.shuffled_to_original[selected as usize];
    if original_index == correct_index {
        Evaluation::correct()
    } else {
        Evaluation::incorrect()
    }
}

fn is_permutation(map: &[i32]) -> bool {
    if map.len() != OPTION_COUNT {
        return false;
    }
    let mut seen = [false; OPTION_COUNT];
    for &index in map {
        if !(0..OPTION_COUNT as i32).contains(&index) || seen[index as usize] {
            return false;
        }
        seen[index as usize] = true;
    }
    true
}
