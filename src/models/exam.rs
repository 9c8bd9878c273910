use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Number of choices per multiple-choice question on the platform.
pub const OPTION_COUNT: usize = 4;

/// An exam document from the `tests` collection. Field names follow the
/// platform's existing camelCase document shape.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Exam {
    pub id: String,
    #[serde(default)]
    pub title: String,
    /// Questions in original (unshuffled) order; 1-based position is the
    /// answer's `originalQuestionNumber`.
    #[serde(default)]
    pub questions: Vec<Question>,
    #[serde(default)]
    pub shuffle_options: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: String,
    #[serde(default)]
    pub options: Vec<String>,
    /// Index into the original option order, valid range [0,3]. Historical
    /// data contains nulls and out-of-range values; the evaluator flags
    /// those instead of trusting them.
    #[serde(default)]
    pub correct_answer_index: Option<i32>,
}

impl Exam {
    pub fn question_by_id(&self, question_id: &str) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == question_id)
    }

    /// Looks up a question by its 1-based original position.
    pub fn question_by_number(&self, original_question_number: i32) -> Option<&Question> {
        if original_question_number < 1 {
            return None;
        }
        self.questions.get(original_question_number as usize - 1)
    }
}

impl Question {
    /// The correct index when present and within [0,3]; `None` for the
    /// historical defects (null or out-of-range values).
    pub fn valid_correct_index(&self) -> Option<i32> {
        self.correct_answer_index
            .filter(|i| (0..OPTION_COUNT as i32).contains(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_exam() -> Exam {
        Exam {
            id: "exam-1".to_string(),
            title: "Midterm".to_string(),
            questions: vec![
                Question {
                    id: "q-1".to_string(),
                    options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
                    correct_answer_index: Some(2),
                },
                Question {
                    id: "q-2".to_string(),
                    options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
                    correct_answer_index: Some(0),
                },
            ],
            shuffle_options: true,
            created_at: Some(Utc::now()),
        }
    }

    #[test]
    fn question_lookup_by_id_and_number_agree() {
        let exam = make_exam();

        assert_eq!(exam.question_by_id("q-2").unwrap().id, "q-2");
        assert_eq!(exam.question_by_number(2).unwrap().id, "q-2");
        assert!(exam.question_by_id("q-99").is_none());
        assert!(exam.question_by_number(3).is_none());
        assert!(exam.question_by_number(0).is_none());
        assert!(exam.question_by_number(-4).is_none());
    }

    #[test]
    fn exam_deserializes_from_camel_case_document() {
        let json = r#"{
            "id": "exam-7",
            "title": "Finals",
            "shuffleOptions": true,
            "questions": [
                {"id": "q-1", "options": ["w", "x", "y", "z"], "correctAnswerIndex": 3}
            ]
        }"#;

        let exam: Exam = serde_json::from_str(json).expect("exam should deserialize");

        assert!(exam.shuffle_options);
        assert_eq!(exam.questions[0].correct_answer_index, Some(3));
    }

    #[test]
    fn question_with_null_correct_index_still_loads() {
        let json = r#"{"id": "q-1", "options": ["a", "b", "c", "d"], "correctAnswerIndex": null}"#;
        let question: Question = serde_json::from_str(json).expect("question should deserialize");

        assert_eq!(question.correct_answer_index, None);
        assert_eq!(question.valid_correct_index(), None);
    }

    #[test]
    fn out_of_range_correct_index_is_invalid() {
        let mut question = make_exam().questions[0].clone();
        assert_eq!(question.valid_correct_index(), Some(2));

        question.correct_answer_index = Some(4);
        assert_eq!(question.valid_correct_index(), None);

        question.correct_answer_index = Some(-1);
        assert_eq!(question.valid_correct_index(), None);
    }
}
