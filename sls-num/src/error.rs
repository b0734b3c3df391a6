//! Error type shared by all numeric backends.

use thiserror::Error;

/// Failure of a backend arithmetic operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum NumError {
    /// The result cannot be represented by the backend.
    #[error("arithmetic overflow")]
    Overflow,
}

/// Result alias for backend arithmetic.
pub type NumResult<T> = Result<T, NumError>;
