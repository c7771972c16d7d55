//! Error types for the factorization engine.

use std::fmt;

/// Errors reported by the symbolic, numeric and solve phases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A buffer needed by the factorization could not be allocated.
    OutOfMemory,
    /// The input matrix or the call arguments are not acceptable
    /// (non-square matrix, empty column, bad permutation, bad threshold,
    /// mismatched dimensions).
    MalformedInput { reason: String },
    /// A front could not be factored: no pivot row with non-zero modulus was
    /// available for one of its columns. The whole factor is discarded.
    NumericFailure,
}

impl Error {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Error::MalformedInput {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::OutOfMemory => write!(f, "out of memory"),
            Error::MalformedInput { reason } => write!(f, "malformed input: {}", reason),
            Error::NumericFailure => {
                write!(f, "numeric failure: zero pivot column, matrix is singular")
            }
        }
    }
}

impl std::error::Error for Error {}
