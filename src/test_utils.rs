//! Fixtures shared by the unit tests and the integration tests in `tests/`.

use crate::models::{Answer, Exam, Question, Submission};

pub mod fixtures {
    use super::*;

    /// Four-option question with the given correct index.
    pub fn question(id: &str, correct_answer_index: i32) -> Question {
        Question {
            id: id.to_string(),
            options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
            correct_answer_index: Some(correct_answer_index),
        }
    }

    /// Exam whose question n (1-based) has correct index (n - 1) % 4.
    pub fn exam(id: &str, question_count: usize) -> Exam {
        Exam {
            id: id.to_string(),
            title: format!("Exam {}", id),
            questions: (1..=question_count)
                .map(|n| question(&format!("{}-q{}", id, n), ((n - 1) % 4) as i32))
                .collect(),
            shuffle_options: true,
            created_at: None,
        }
    }

    pub fn answer(question_id: &str, number: i32, selected: Option<i32>, map: Vec<i32>) -> Answer {
        Answer {
            question_id: question_id.to_string(),
            original_question_number: number,
            selected_answer: selected,
            shuffled_to_original: map,
            is_correct: false,
        }
    }

    pub fn submission(id: &str, test_id: &str, answers: Vec<Answer>) -> Submission {
        let total = answers.len() as i32;
        Submission {
            id: id.to_string(),
            test_id: test_id.to_string(),
            enrollment_no: Some(format!("EN-{}", id)),
            answers,
            score: 0,
            total_questions: total,
            created_at: None,
            test_started_at: None,
            submitted_at: None,
            is_draft: false,
            is_completed: true,
        }
    }
}
