use ml_core::{DataError, Dataset, Sample};

/// A minimal in-memory dataset.
///
/// Design goals:
/// - deterministic and test-friendly
/// - small API surface
/// - the source every shard points back to
#[derive(Debug, Clone, Default)]
pub struct InMemoryDataset {
    samples: Vec<Sample>,
}

impl InMemoryDataset {
    /// Creates a new dataset from owned samples.
    pub fn new(samples: Vec<Sample>) -> Self {
        Self { samples }
    }

    /// Creates a dataset of dense samples from parallel feature and target buffers.
    ///
    /// # Errors
    /// Returns `DataError::InvalidSample` if `xs` and `ys` differ in length.
    pub fn from_dense(xs: Vec<Vec<f32>>, ys: Vec<f32>) -> Result<Self, DataError> {
        if xs.len() != ys.len() {
            return Err(DataError::InvalidSample("xs and ys must have same length"));
        }

        let samples = xs.into_iter().zip(ys).map(|(x, y)| Sample::dense(x, y)).collect();
        Ok(Self { samples })
    }

    #[inline]
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }
}

impl Dataset for InMemoryDataset {
    #[inline]
    fn len(&self) -> usize {
        self.samples.len()
    }

    fn get(&self, index: usize) -> Result<Sample, DataError> {
        self.samples
            .get(index)
            .cloned()
            .ok_or(DataError::OutOfBounds {
                index,
                len: self.samples.len(),
            })
    }
}
