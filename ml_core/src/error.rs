use std::fmt;

use ndarray::ShapeError;

use crate::DataError;

/// Errors produced by models, losses and batch collation when inputs are invalid.
#[derive(Debug)]
pub enum MlError {
    /// An input is invalid for semantic or domain reasons.
    InvalidInput(&'static str),

    /// A shape invariant was violated (e.g. mismatched lengths).
    ShapeMismatch {
        /// Human-readable context for the mismatch (e.g. "params", "batch").
        what: &'static str,
        /// Observed value.
        got: usize,
        /// Expected value.
        expected: usize,
    },

    /// The requested operation is not implemented for this model or input kind.
    Unsupported(&'static str),

    /// ndarray refused to build a view or stack arrays.
    Shape(ShapeError),

    /// A sample could not be fetched from its dataset.
    Data(DataError),
}

impl fmt::Display for MlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MlError::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            MlError::ShapeMismatch { what, got, expected } => {
                write!(f, "shape mismatch for {what}: got {got}, expected {expected}")
            }
            MlError::Unsupported(what) => write!(f, "unsupported operation: {what}"),
            MlError::Shape(e) => write!(f, "shape error: {e}"),
            MlError::Data(e) => write!(f, "data error: {e}"),
        }
    }
}

impl std::error::Error for MlError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MlError::Shape(e) => Some(e),
            MlError::Data(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ShapeError> for MlError {
    fn from(value: ShapeError) -> Self {
        Self::Shape(value)
    }
}

impl From<DataError> for MlError {
    fn from(value: DataError) -> Self {
        Self::Data(value)
    }
}
