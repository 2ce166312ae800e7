//! Error types for the database toolkit

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbKitError {
    #[error("failed to open connection: {0}")]
    Connection(String),

    #[error("query failed: {0}")]
    Query(#[from] sqlx::Error),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed csv at line {line}: {reason}")]
    Csv { line: usize, reason: String },
}

pub type DbKitResult<T> = Result<T, DbKitError>;

impl DbKitError {
    pub(crate) fn invalid_size(name: &str, value: usize) -> Self {
        Self::InvalidArgument(format!("{name} must be greater than zero, got {value}"))
    }
}
