//! I/O error types.

use thiserror::Error;

/// Result type for I/O operations.
pub type Result<T> = std::result::Result<T, Error>;

/// I/O error types.
#[derive(Error, Debug)]
pub enum Error {
    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Text that does not follow the expected layout.
    #[error("invalid format at line {line}: {message}")]
    InvalidFormat {
        /// 1-based line number, 0 when not tied to a line.
        line: usize,
        /// What was wrong.
        message: String,
    },

    /// Core library error.
    #[error("core error: {0}")]
    CoreError(#[from] reflred_core::Error),
}

impl Error {
    pub(crate) fn format(line: usize, message: impl Into<String>) -> Self {
        Error::InvalidFormat {
            line,
            message: message.into(),
        }
    }
}
