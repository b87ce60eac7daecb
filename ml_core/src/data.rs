use std::fmt;

use crate::Sample;

/// Errors produced while accessing dataset samples.
#[derive(Debug)]
pub enum DataError {
    /// The requested sample index is out of bounds.
    OutOfBounds { index: usize, len: usize },

    /// The dataset could not provide a valid sample due to domain constraints.
    InvalidSample(&'static str),
}

impl fmt::Display for DataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataError::OutOfBounds { index, len } => {
                write!(f, "sample index {index} is out of bounds for a dataset of {len}")
            }
            DataError::InvalidSample(msg) => write!(f, "invalid sample: {msg}"),
        }
    }
}

impl std::error::Error for DataError {}

/// A finite, indexable collection of samples.
///
/// A `Dataset` is responsible only for *providing access* to samples.
/// It does not define:
/// - how samples are batched,
/// - how they are split among clients,
/// - any specific model or loss function.
pub trait Dataset: Send + Sync {
    /// Returns the total number of samples.
    fn len(&self) -> usize;

    /// Returns `true` if the dataset holds no samples.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fetches a sample by index.
    ///
    /// # Errors
    /// Returns `DataError::OutOfBounds` if `index` is invalid.
    fn get(&self, index: usize) -> Result<Sample, DataError>;
}
