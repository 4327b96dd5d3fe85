use thiserror::Error;

/// Rejected node input. Every variant is a client mistake.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("label must not be empty")]
    EmptyLabel,
    #[error("label must be at most {max} characters, got {length}")]
    LabelTooLong { length: usize, max: usize },
    #[error("parentId must be a positive integer, got {0}")]
    InvalidParentId(i64),
}
