//! Run report: totals, per-correction audit rows, and the renderers for the
//! console summary, JSON export, and CSV exports.

use std::fmt;
use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::errors::AppResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum RunMode {
    /// Dry run: compute every discrepancy, persist nothing.
    Analyze,
    /// Apply corrections to the store.
    Fix,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Analyze => f.write_str("analyze (dry run)"),
            RunMode::Fix => f.write_str("fix"),
        }
    }
}

/// One corrected answer, sufficient for audit.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerCorrection {
    pub submission_id: String,
    pub enrollment_no: Option<String>,
    pub question_id: String,
    pub question_number: i32,
    pub selected_answer: Option<i32>,
    pub correct_answer_index: Option<i32>,
    pub shuffled_to_original: Vec<i32>,
    pub previous_is_correct: bool,
    pub new_is_correct: bool,
}

/// One submission whose aggregate score changed.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreCorrection {
    pub submission_id: String,
    pub enrollment_no: Option<String>,
    pub previous_score: i32,
    pub new_score: i32,
    pub delta: i32,
    pub total_questions: i32,
}

/// One submission that could not be read or written; the batch continued
/// past it.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemFailure {
    pub submission_id: String,
    pub cause: String,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationReport {
    pub run_id: String,
    pub mode: RunMode,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,

    /// Matching submissions counted before paging began.
    pub total_candidates: u64,
    /// Submissions actually loaded and examined; may differ from
    /// `total_candidates` if the collection mutated mid-run.
    pub submissions_visited: u64,
    pub answers_evaluated: u64,
    pub malformed_answers: u64,
    pub skipped_orphaned: u64,
    pub skipped_corrupted: u64,

    pub answer_corrections: Vec<AnswerCorrection>,
    pub score_corrections: Vec<ScoreCorrection>,
    /// Submissions whose exam could not be loaded (the read failed, as
    /// opposed to the exam not existing, which counts as orphaned).
    pub failed_reads: Vec<ItemFailure>,
    pub failed_writes: Vec<ItemFailure>,

    /// False when the run terminated early on a paging failure; whatever was
    /// processed before the fault is still reported.
    pub completed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fatal_error: Option<String>,
}

impl ReconciliationReport {
    pub fn new(run_id: String, mode: RunMode, total_candidates: u64) -> Self {
        Self {
            run_id,
            mode,
            started_at: Utc::now(),
            finished_at: None,
            total_candidates,
            submissions_visited: 0,
            answers_evaluated: 0,
            malformed_answers: 0,
            skipped_orphaned: 0,
            skipped_corrupted: 0,
            answer_corrections: Vec::new(),
            score_corrections: Vec::new(),
            failed_reads: Vec::new(),
            failed_writes: Vec::new(),
            completed: false,
            fatal_error: None,
        }
    }

    pub fn answers_corrected(&self) -> u64 {
        self.answer_corrections.len() as u64
    }

    pub fn scores_changed(&self) -> u64 {
        self.score_corrections.len() as u64
    }

    pub fn scores_improved(&self) -> u64 {
        self.score_corrections.iter().filter(|c| c.delta > 0).count() as u64
    }

    pub fn scores_decreased(&self) -> u64 {
        self.score_corrections.iter().filter(|c| c.delta < 0).count() as u64
    }

    pub fn net_score_delta(&self) -> i64 {
        self.score_corrections.iter().map(|c| c.delta as i64).sum()
    }

    pub fn largest_delta_magnitude(&self) -> i32 {
        self.score_corrections
            .iter()
            .map(|c| c.delta.abs())
            .max()
            .unwrap_or(0)
    }

    /// Human-readable summary with up to `top_n` score-change samples.
    pub fn render_summary(&self, top_n: usize) -> String {
        let mut out = String::new();

        let status = if self.completed {
            "complete"
        } else {
            "PARTIAL, run did not complete"
        };
        let _ = writeln!(out, "Reconciliation run {} [{}]", self.run_id, self.mode);
        let _ = writeln!(out, "Status: {}", status);
        if let Some(cause) = &self.fatal_error {
            let _ = writeln!(out, "Fatal error: {}", cause);
        }
        let _ = writeln!(
            out,
            "Submissions: {} visited of {} counted",
            self.submissions_visited, self.total_candidates
        );
        let _ = writeln!(
            out,
            "Answers: {} evaluated, {} corrected, {} malformed",
            self.answers_evaluated,
            self.answers_corrected(),
            self.malformed_answers
        );
        let _ = writeln!(
            out,
            "Scores: {} changed ({} improved, {} decreased, net {:+}, largest |delta| {})",
            self.scores_changed(),
            self.scores_improved(),
            self.scores_decreased(),
            self.net_score_delta(),
            self.largest_delta_magnitude()
        );
        let _ = writeln!(
            out,
            "Skipped: {} orphaned (test not found), {} corrupted (duplicate question numbers)",
            self.skipped_orphaned, self.skipped_corrupted
        );
        let _ = writeln!(out, "Failed reads: {}", self.failed_reads.len());
        for failure in &self.failed_reads {
            let _ = writeln!(out, "  {}: {}", failure.submission_id, failure.cause);
        }
        let _ = writeln!(out, "Failed writes: {}", self.failed_writes.len());
        for failure in &self.failed_writes {
            let _ = writeln!(out, "  {}: {}", failure.submission_id, failure.cause);
        }

        if !self.score_corrections.is_empty() {
            let shown = top_n.min(self.score_corrections.len());
            let _ = writeln!(
                out,
                "Top score changes (showing {} of {}):",
                shown,
                self.score_corrections.len()
            );
            let mut samples: Vec<&ScoreCorrection> = self.score_corrections.iter().collect();
            samples.sort_by_key(|c| std::cmp::Reverse(c.delta.abs()));
            for correction in samples.into_iter().take(top_n) {
                let _ = writeln!(
                    out,
                    "  {} ({}): {} -> {} ({:+} of {})",
                    correction.submission_id,
                    correction.enrollment_no.as_deref().unwrap_or("-"),
                    correction.previous_score,
                    correction.new_score,
                    correction.delta,
                    correction.total_questions
                );
            }
        }

        out
    }

    pub fn to_json(&self) -> AppResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// CSV with one row per corrected answer.
    pub fn answer_corrections_csv(&self) -> String {
        let mut csv = String::from(
            "submissionId,enrollmentNo,questionId,questionNumber,selectedAnswer,\
             correctAnswerIndex,shuffledToOriginal,previousIsCorrect,newIsCorrect\n",
        );
        for row in &self.answer_corrections {
            let _ = writeln!(
                csv,
                "{},{},{},{},{},{},{},{},{}",
                csv_escape(&row.submission_id),
                csv_escape(row.enrollment_no.as_deref().unwrap_or("")),
                csv_escape(&row.question_id),
                row.question_number,
                opt_i32(row.selected_answer),
                opt_i32(row.correct_answer_index),
                csv_escape(&format!("{:?}", row.shuffled_to_original)),
                row.previous_is_correct,
                row.new_is_correct
            );
        }
        csv
    }

    /// CSV with one row per submission whose score changed.
    pub fn score_corrections_csv(&self) -> String {
        let mut csv =
            String::from("submissionId,enrollmentNo,previousScore,newScore,delta,totalQuestions\n");
        for row in &self.score_corrections {
            let _ = writeln!(
                csv,
                "{},{},{},{},{},{}",
                csv_escape(&row.submission_id),
                csv_escape(row.enrollment_no.as_deref().unwrap_or("")),
                row.previous_score,
                row.new_score,
                row.delta,
                row.total_questions
            );
        }
        csv
    }
}

fn opt_i32(value: Option<i32>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn csv_escape(s: &str) -> String {
    if s.contains([',', '"', '\n', '\r']) {
        let mut out = String::with_capacity(s.len() + 2);
        out.push('"');
        for ch in s.chars() {
            if ch == '"' {
                out.push('"'); // escape quotes
            }
            out.push(ch);
        }
        out.push('"');
        out
    } else {
        s.to_string()
    }
}
