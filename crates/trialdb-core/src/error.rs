use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrialError {
    #[error("malformed log filename: {0}")]
    MalformedFilename(String),

    #[error("malformed log at line {line}: {reason}")]
    MalformedLog { line: usize, reason: String },

    #[error("codec error: {0}")]
    Codec(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type TrialResult<T> = Result<T, TrialError>;
