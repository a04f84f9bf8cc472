//! Error types for reflred-core.

use thiserror::Error;

/// Result type alias for reflred operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for reflred operations.
///
/// Configuration problems are reported through these variants and abort the
/// reduction call. Numeric degeneracies (empty reference bins, zero-area
/// windows) are never errors; they surface as non-finite values in the output.
#[derive(Error, Debug)]
pub enum Error {
    /// Generic configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Bin edges stop growing (or overflow) before reaching the upper limit.
    #[error("bin generation does not terminate: edges stop growing before qmax")]
    NonTerminatingBins,

    /// A parameter that must be strictly positive is not.
    #[error("{name} must be strictly positive, got {value}")]
    NonPositive { name: &'static str, value: f64 },

    /// A range whose lower bound is not below its upper bound.
    #[error("invalid {name} range: [{min}, {max}]")]
    InvalidRange {
        name: &'static str,
        min: f64,
        max: f64,
    },

    /// An expression or projection referenced a column the table does not carry.
    #[error("missing column: {0}")]
    MissingColumn(String),

    /// Column lengths disagree.
    #[error("column {column} has {actual} entries, expected {expected}")]
    LengthMismatch {
        column: String,
        expected: usize,
        actual: usize,
    },

    /// Bin specification cannot produce a histogram.
    #[error("invalid bins: {0}")]
    InvalidBins(String),

    /// Configuration file could not be parsed.
    #[error("invalid configuration JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration file could not be read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Checks that `value` is finite and strictly positive.
    ///
    /// # Errors
    /// Returns [`Error::NonPositive`] naming the offending parameter.
    pub fn ensure_positive(name: &'static str, value: f64) -> Result<f64> {
        if value.is_finite() && value > 0.0 {
            Ok(value)
        } else {
            Err(Error::NonPositive { name, value })
        }
    }
}
