//! Error types for pagehits

use thiserror::Error;

/// Result type alias for pagehits operations
pub type Result<T> = std::result::Result<T, PagehitsError>;

/// Main error type for pagehits
#[derive(Error, Debug)]
pub enum PagehitsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Source not found: {0}")]
    SourceNotFound(String),
}

impl PagehitsError {
    pub fn parse(line: usize, message: impl Into<String>) -> Self {
        PagehitsError::Parse {
            line,
            message: message.into(),
        }
    }
}
