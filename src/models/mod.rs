pub mod exam;
pub mod submission;

pub use exam::{Exam, Question};
pub use submission::{Answer, Submission};
