//! Reconciliation batch runner.
//!
//! Pages through persisted submissions, re-evaluates every answer through the
//! evaluator, recomputes each submission's score, and repairs drift. Strictly
//! sequential: one page, one submission, one answer at a time, so write
//! ordering stays simple and the per-run exam cache needs no locking.
//!
//! Safe to re-run with the same filter any number of times; it only ever sets
//! fields to their derived values. Two overlapping concurrent runs may stomp
//! on each other's writes; since both derive from the same source data the
//! end state is identical, and no coordination is attempted.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::{
    errors::AppResult,
    evaluator::{evaluate, resolve_question},
    models::{Exam, Submission},
    report::{AnswerCorrection, ItemFailure, ReconciliationReport, RunMode, ScoreCorrection},
    repositories::{ExamRepository, SubmissionFilter, SubmissionRepository},
};

#[derive(Clone, Debug)]
pub struct RunOptions {
    pub mode: RunMode,
    pub filter: SubmissionFilter,
    pub batch_size: u64,
}

pub struct ReconciliationService {
    exams: Arc<dyn ExamRepository>,
    submissions: Arc<dyn SubmissionRepository>,
}

impl ReconciliationService {
    pub fn new(
        exams: Arc<dyn ExamRepository>,
        submissions: Arc<dyn SubmissionRepository>,
    ) -> Self {
        Self { exams, submissions }
    }

    /// Runs one reconciliation pass over all submissions matching the filter.
    ///
    /// The initial count failing is fatal and returns `Err` (nothing was
    /// processed, nothing is claimed). A page fetch failing mid-run ends the
    /// run early but still returns the partial report, marked incomplete. A
    /// single submission failing to persist is recorded and skipped over.
    pub async fn reconcile(&self, options: &RunOptions) -> AppResult<ReconciliationReport> {
        let batch_size = options.batch_size.max(1);
        // The driver takes an i64 limit; an absurd batch size must not wrap.
        let page_limit = batch_size.min(i64::MAX as u64) as i64;
        let total = self.submissions.count(&options.filter).await?;

        let mut report =
            ReconciliationReport::new(Uuid::new_v4().to_string(), options.mode, total);
        log::info!(
            "Reconciliation run {} [{}]: {} candidate submissions, batch size {}",
            report.run_id,
            report.mode,
            total,
            batch_size
        );

        // Exam lookups memoized per run; misses are cached too so an orphaned
        // test id is fetched once, not once per submission.
        let mut exam_cache: HashMap<String, Option<Exam>> = HashMap::new();
        let mut skip: u64 = 0;

        loop {
            let page = match self
                .submissions
                .find_page(&options.filter, skip, page_limit)
                .await
            {
                Ok(page) => page,
                Err(err) => {
                    log::error!("Run {} failed fetching page: {}", report.run_id, err);
                    report.fatal_error = Some(err.to_string());
                    break;
                }
            };

            if page.is_empty() {
                report.completed = true;
                break;
            }

            let page_len = page.len();
            for submission in page {
                self.process_submission(submission, &mut exam_cache, &mut report, options.mode)
                    .await;
            }
            skip += page_len as u64;

            log::info!(
                "Run {}: {}/{} submissions visited, {} answers corrected so far",
                report.run_id,
                report.submissions_visited,
                total,
                report.answers_corrected()
            );

            if (page_len as u64) < batch_size {
                report.completed = true;
                break;
            }
        }

        report.finished_at = Some(Utc::now());
        Ok(report)
    }

    async fn process_submission(
        &self,
        mut submission: Submission,
        exam_cache: &mut HashMap<String, Option<Exam>>,
        report: &mut ReconciliationReport,
        mode: RunMode,
    ) {
        report.submissions_visited += 1;

        if !exam_cache.contains_key(&submission.test_id) {
            match self.exams.find_by_id(&submission.test_id).await {
                Ok(exam) => {
                    exam_cache.insert(submission.test_id.clone(), exam);
                }
                Err(err) => {
                    // Per-item read failure: recorded, batch continues.
                    log::error!(
                        "Failed to load test {} for submission {}: {}",
                        submission.test_id,
                        submission.id,
                        err
                    );
                    report.failed_reads.push(ItemFailure {
                        submission_id: submission.id,
                        cause: format!("failed to load test {}: {}", submission.test_id, err),
                    });
                    return;
                }
            }
        }

        let Some(exam) = exam_cache.get(&submission.test_id).and_then(|e| e.as_ref()) else {
            log::warn!(
                "Skipping submission {}: test {} not found",
                submission.id,
                submission.test_id
            );
            report.skipped_orphaned += 1;
            return;
        };

        if submission.has_duplicate_question_numbers() {
            // The number fallback key is unreliable in exactly these records,
            // so they are surfaced for manual review, never auto-repaired.
            log::warn!(
                "Skipping submission {}: duplicate originalQuestionNumber values",
                submission.id
            );
            report.skipped_corrupted += 1;
            return;
        }

        let corrections_before = report.answer_corrections.len();
        let previous_score = submission.score;

        for answer in &mut submission.answers {
            report.answers_evaluated += 1;

            let question = resolve_question(exam, answer);
            let evaluation = evaluate(answer, question);

            if evaluation.malformed {
                report.malformed_answers += 1;
                if let Some(reason) = evaluation.reason {
                    log::warn!(
                        "Submission {} question {}: {}",
                        submission.id,
                        answer.question_id,
                        reason
                    );
                }
            }

            if evaluation.is_correct != answer.is_correct {
                report.answer_corrections.push(AnswerCorrection {
                    submission_id: submission.id.clone(),
                    enrollment_no: submission.enrollment_no.clone(),
                    question_id: answer.question_id.clone(),
                    question_number: answer.original_question_number,
                    selected_answer: answer.selected_answer,
                    correct_answer_index: question.and_then(|q| q.correct_answer_index),
                    shuffled_to_original: answer.shuffled_to_original.clone(),
                    previous_is_correct: answer.is_correct,
                    new_is_correct: evaluation.is_correct,
                });
                answer.is_correct = evaluation.is_correct;
            }
        }

        let new_score = submission.correct_count();
        let score_changed = new_score != previous_score;
        let answers_changed = report.answer_corrections.len() > corrections_before;

        if score_changed {
            report.score_corrections.push(ScoreCorrection {
                submission_id: submission.id.clone(),
                enrollment_no: submission.enrollment_no.clone(),
                previous_score,
                new_score,
                delta: new_score - previous_score,
                total_questions: submission.total_questions,
            });
            submission.score = new_score;
        }

        if (answers_changed || score_changed) && mode == RunMode::Fix {
            if let Err(err) = self.submissions.update_grading(&submission).await {
                log::error!("Failed to persist submission {}: {}", submission.id, err);
                report.failed_writes.push(ItemFailure {
                    submission_id: submission.id,
                    cause: err.to_string(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AppError;
    use crate::models::{Answer, Question};
    use crate::repositories::{MockExamRepository, MockSubmissionRepository};

    fn exam_with_one_question() -> Exam {
        Exam {
            id: "exam-1".to_string(),
            title: "Midterm".to_string(),
            questions: vec![Question {
                id: "q-1".to_string(),
                options: vec!["a".into(), "b".into(), "c".into(), "d".into()],
                correct_answer_index: Some(2),
            }],
            shuffle_options: true,
            created_at: None,
        }
    }

    fn submission_with_drift(id: &str) -> Submission {
        // Student picked shuffled index 0, which maps to original option 2:
        // actually correct, but stored as incorrect with score 0.
        Submission {
            id: id.to_string(),
            test_id: "exam-1".to_string(),
            enrollment_no: Some("EN-001".to_string()),
            answers: vec![Answer {
                question_id: "q-1".to_string(),
                original_question_number: 1,
                selected_answer: Some(0),
                shuffled_to_original: vec![2, 0, 3, 1],
                is_correct: false,
            }],
            score: 0,
            total_questions: 1,
            created_at: None,
            test_started_at: None,
            submitted_at: None,
            is_draft: false,
            is_completed: true,
        }
    }

    fn options(mode: RunMode) -> RunOptions {
        RunOptions {
            mode,
            filter: SubmissionFilter::all(),
            batch_size: 50,
        }
    }

    #[tokio::test]
    async fn count_failure_is_fatal() {
        let exams = MockExamRepository::new();
        let mut submissions = MockSubmissionRepository::new();
        submissions
            .expect_count()
            .returning(|_| Err(AppError::DatabaseError("no connection".into())));

        let service = ReconciliationService::new(Arc::new(exams), Arc::new(submissions));
        let result = service.reconcile(&options(RunMode::Analyze)).await;

        assert!(matches!(result, Err(AppError::DatabaseError(_))));
    }

    #[tokio::test]
    async fn page_failure_returns_partial_report() {
        let mut exams = MockExamRepository::new();
        exams
            .expect_find_by_id()
            .returning(|_| Ok(Some(exam_with_one_question())));

        let mut submissions = MockSubmissionRepository::new();
        submissions.expect_count().returning(|_| Ok(10));
        submissions.expect_find_page().returning(|_, skip, _| {
            if skip == 0 {
                Ok(vec![submission_with_drift("sub-1")])
            } else {
                Err(AppError::DatabaseError("connection reset".into()))
            }
        });

        let service = ReconciliationService::new(Arc::new(exams), Arc::new(submissions));
        let report = service
            .reconcile(&RunOptions {
                mode: RunMode::Analyze,
                filter: SubmissionFilter::all(),
                batch_size: 1,
            })
            .await
            .expect("partial report expected");

        assert!(!report.completed);
        assert_eq!(report.fatal_error.as_deref(), Some("Database error: connection reset"));
        assert_eq!(report.submissions_visited, 1);
        assert_eq!(report.answers_corrected(), 1);
    }

    #[tokio::test]
    async fn exam_lookup_is_memoized_per_run() {
        let mut exams = MockExamRepository::new();
        exams
            .expect_find_by_id()
            .times(1)
            .returning(|_| Ok(Some(exam_with_one_question())));

        let mut submissions = MockSubmissionRepository::new();
        submissions.expect_count().returning(|_| Ok(2));
        submissions.expect_find_page().returning(|_, skip, _| {
            if skip == 0 {
                Ok(vec![
                    submission_with_drift("sub-1"),
                    submission_with_drift("sub-2"),
                ])
            } else {
                Ok(vec![])
            }
        });

        let service = ReconciliationService::new(Arc::new(exams), Arc::new(submissions));
        let report = service
            .reconcile(&options(RunMode::Analyze))
            .await
            .expect("run should succeed");

        assert!(report.completed);
        assert_eq!(report.submissions_visited, 2);
        assert_eq!(report.scores_changed(), 2);
    }

    #[tokio::test]
    async fn dry_run_never_writes() {
        let mut exams = MockExamRepository::new();
        exams
            .expect_find_by_id()
            .returning(|_| Ok(Some(exam_with_one_question())));

        let mut submissions = MockSubmissionRepository::new();
        submissions.expect_count().returning(|_| Ok(1));
        submissions.expect_find_page().returning(|_, skip, _| {
            if skip == 0 {
                Ok(vec![submission_with_drift("sub-1")])
            } else {
                Ok(vec![])
            }
        });
        // No expect_update_grading: any write would panic the mock.

        let service = ReconciliationService::new(Arc::new(exams), Arc::new(submissions));
        let report = service
            .reconcile(&options(RunMode::Analyze))
            .await
            .expect("dry run should succeed");

        assert_eq!(report.answers_corrected(), 1);
        assert_eq!(report.score_corrections[0].delta, 1);
    }

    #[tokio::test]
    async fn failed_write_does_not_abort_the_batch() {
        let mut exams = MockExamRepository::new();
        exams
            .expect_find_by_id()
            .returning(|_| Ok(Some(exam_with_one_question())));

        let mut submissions = MockSubmissionRepository::new();
        submissions.expect_count().returning(|_| Ok(2));
        submissions.expect_find_page().returning(|_, skip, _| {
            if skip == 0 {
                Ok(vec![
                    submission_with_drift("sub-1"),
                    submission_with_drift("sub-2"),
                ])
            } else {
                Ok(vec![])
            }
        });
        submissions.expect_update_grading().returning(|submission| {
            if submission.id == "sub-1" {
                Err(AppError::DatabaseError("write conflict".into()))
            } else {
                Ok(())
            }
        });

        let service = ReconciliationService::new(Arc::new(exams), Arc::new(submissions));
        let report = service
            .reconcile(&options(RunMode::Fix))
            .await
            .expect("run should succeed");

        assert!(report.completed);
        assert_eq!(report.failed_writes.len(), 1);
        assert_eq!(report.failed_writes[0].submission_id, "sub-1");
        assert_eq!(report.submissions_visited, 2);
        assert_eq!(report.scores_changed(), 2);
    }

    #[tokio::test]
    async fn failed_exam_read_is_recorded_as_read_failure() {
        let mut exams = MockExamRepository::new();
        exams
            .expect_find_by_id()
            .returning(|_| Err(AppError::DatabaseError("timeout".into())));

        let mut submissions = MockSubmissionRepository::new();
        submissions.expect_count().returning(|_| Ok(1));
        submissions.expect_find_page().returning(|_, skip, _| {
            if skip == 0 {
                Ok(vec![submission_with_drift("sub-1")])
            } else {
                Ok(vec![])
            }
        });
        // No expect_update_grading: the submission must be left untouched.

        let service = ReconciliationService::new(Arc::new(exams), Arc::new(submissions));
        let report = service
            .reconcile(&options(RunMode::Fix))
            .await
            .expect("run should succeed");

        assert!(report.completed);
        assert_eq!(report.failed_reads.len(), 1);
        assert_eq!(report.failed_reads[0].submission_id, "sub-1");
        assert!(report.failed_reads[0].cause.contains("exam-1"));
        assert!(report.failed_writes.is_empty());
        assert_eq!(report.answers_evaluated, 0);
    }

    #[tokio::test]
    async fn oversized_batch_size_is_clamped_for_the_driver() {
        let exams = MockExamRepository::new();
        let mut submissions = MockSubmissionRepository::new();
        submissions.expect_count().returning(|_| Ok(0));
        submissions
            .expect_find_page()
            .withf(|_, _, limit| *limit == i64::MAX)
            .returning(|_, _, _| Ok(vec![]));

        let service = ReconciliationService::new(Arc::new(exams), Arc::new(submissions));
        let report = service
            .reconcile(&RunOptions {
                mode: RunMode::Analyze,
                filter: SubmissionFilter::all(),
                batch_size: u64::MAX,
            })
            .await
            .expect("run should succeed");

        assert!(report.completed);
    }

    #[tokio::test]
    async fn orphaned_submission_is_skipped_untouched() {
        let mut exams = MockExamRepository::new();
        exams.expect_find_by_id().times(1).returning(|_| Ok(None));

        let mut submissions = MockSubmissionRepository::new();
        submissions.expect_count().returning(|_| Ok(1));
        submissions.expect_find_page().returning(|_, skip, _| {
            if skip == 0 {
                let mut submission = submission_with_drift("sub-1");
                submission.test_id = "gone".to_string();
                Ok(vec![submission])
            } else {
                Ok(vec![])
            }
        });

        let service = ReconciliationService::new(Arc::new(exams), Arc::new(submissions));
        let report = service
            .reconcile(&options(RunMode::Fix))
            .await
            .expect("run should succeed");

        assert_eq!(report.skipped_orphaned, 1);
        assert_eq!(report.answers_evaluated, 0);
        assert_eq!(report.answers_corrected(), 0);
    }

    #[tokio::test]
    async fn corrupted_submission_is_flagged_not_scored() {
        let mut exams = MockExamRepository::new();
        exams
            .expect_find_by_id()
            .returning(|_| Ok(Some(exam_with_one_question())));

        let mut submissions = MockSubmissionRepository::new();
        submissions.expect_count().returning(|_| Ok(1));
        submissions.expect_find_page().returning(|_, skip, _| {
            if skip == 0 {
                let mut submission = submission_with_drift("sub-1");
                let answer = submission.answers[0].clone();
                submission.answers.push(answer); // same originalQuestionNumber twice
                Ok(vec![submission])
            } else {
                Ok(vec![])
            }
        });

        let service = ReconciliationService::new(Arc::new(exams), Arc::new(submissions));
        let report = service
            .reconcile(&options(RunMode::Fix))
            .await
            .expect("run should succeed");

        assert_eq!(report.skipped_corrupted, 1);
        assert_eq!(report.answers_evaluated, 0);
        assert_eq!(report.scores_changed(), 0);
    }
}
