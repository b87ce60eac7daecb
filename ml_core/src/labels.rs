use ndarray::{ArrayD, Axis};

use crate::MlError;

/// Targets of a batch, shaped for a loss function.
#[derive(Debug, Clone, PartialEq)]
pub enum Labels {
    /// Raw regression targets.
    Continuous(ArrayD<f32>),

    /// Class indices.
    Classes(ArrayD<usize>),
}

impl Labels {
    /// Uses the targets as they are.
    ///
    /// A 0-dimensional target is promoted to a length-1 sequence.
    pub fn regression(targets: &ArrayD<f32>) -> Self {
        Self::Continuous(promote_scalar(targets.clone()))
    }

    /// Squeezes a trailing singleton axis and casts the targets to class indices.
    ///
    /// A 0-dimensional result (a single-sample batch of scalar targets) is promoted to a
    /// length-1 sequence.
    ///
    /// # Errors
    /// Returns `MlError::InvalidInput` if a target is negative or not finite.
    pub fn classification(targets: &ArrayD<f32>) -> Result<Self, MlError> {
        let mut squeezed = targets.clone();
        if squeezed.shape().last() == Some(&1) {
            let last = squeezed.ndim() - 1;
            squeezed = squeezed.remove_axis(Axis(last));
        }

        if squeezed.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(MlError::InvalidInput("class targets must be non-negative and finite"));
        }

        let classes = squeezed.mapv(|v| v as usize);
        Ok(Self::Classes(promote_scalar(classes)))
    }

    /// Returns the number of labelled samples (the leading axis length).
    pub fn len(&self) -> usize {
        match self {
            Self::Continuous(y) => y.shape().first().copied().unwrap_or(1),
            Self::Classes(y) => y.shape().first().copied().unwrap_or(1),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the shape of the underlying array.
    pub fn shape(&self) -> &[usize] {
        match self {
            Self::Continuous(y) => y.shape(),
            Self::Classes(y) => y.shape(),
        }
    }
}

fn promote_scalar<A>(array: ArrayD<A>) -> ArrayD<A> {
    if array.ndim() == 0 {
        array.insert_axis(Axis(0))
    } else {
        array
    }
}

#[cfg(test)]
mod tests {
    use ndarray::{ArrayD, IxDyn};

    use super::*;

    #[test]
    fn column_targets_are_squeezed_into_classes() {
        let y = ArrayD::from_shape_vec(IxDyn(&[3, 1]), vec![0.0, 2.0, 1.0]).unwrap();
        let Labels::Classes(classes) = Labels::classification(&y).unwrap() else {
            panic!("expected classes");
        };
        assert_eq!(classes.shape(), &[3]);
        assert_eq!(classes.iter().copied().collect::<Vec<_>>(), vec![0, 2, 1]);
    }

    #[test]
    fn scalar_class_target_is_promoted() {
        let y = ArrayD::from_elem(IxDyn(&[1]), 4.0);
        let labels = Labels::classification(&y).unwrap();
        assert_eq!(labels.shape(), &[1]);
        assert_eq!(labels.len(), 1);
    }

    #[test]
    fn scalar_regression_target_is_promoted() {
        let y = ArrayD::from_elem(IxDyn(&[]), 0.5);
        let labels = Labels::regression(&y);
        assert_eq!(labels.shape(), &[1]);
    }

    #[test]
    fn multi_sample_batches_keep_their_shape() {
        let y = ArrayD::from_shape_vec(IxDyn(&[4]), vec![1.0, 0.0, 1.0, 1.0]).unwrap();
        assert_eq!(Labels::classification(&y).unwrap().shape(), &[4]);
        assert_eq!(Labels::regression(&y).shape(), &[4]);
    }

    #[test]
    fn negative_class_is_rejected() {
        let y = ArrayD::from_elem(IxDyn(&[2]), -1.0);
        assert!(Labels::classification(&y).is_err());
    }
}
