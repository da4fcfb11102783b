use thiserror::Error;

use crate::models::QuestionKind;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FeedbackError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    AlreadyExists(String),

    #[error("{0}")]
    InvalidParameters(String),

    #[error("Invalid question {number}: {reason}")]
    InvalidQuestion { number: u32, reason: String },

    #[error("Unknown participant '{id}' in question {number}")]
    UnknownParticipant { number: u32, id: String },

    #[error("Answer of type {found} does not match question of type {expected}")]
    AnswerMismatch {
        expected: QuestionKind,
        found: QuestionKind,
    },

    #[error("Failed to render results table: {0}")]
    Render(String),
}

pub type Result<T> = std::result::Result<T, FeedbackError>;

impl FeedbackError {
    pub fn session_not_found(action: &str, course_id: &str, session_name: &str) -> Self {
        FeedbackError::NotFound(format!(
            "Trying to {action} a non-existent feedback session: {course_id}/{session_name}"
        ))
    }
}
