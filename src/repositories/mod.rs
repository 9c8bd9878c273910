pub mod exam_repository;
pub mod submission_repository;

pub use exam_repository::{ExamRepository, MongoExamRepository};
pub use submission_repository::{MongoSubmissionRepository, SubmissionFilter, SubmissionRepository};

#[cfg(test)]
pub use exam_repository::MockExamRepository;
#[cfg(test)]
pub use submission_repository::MockSubmissionRepository;
