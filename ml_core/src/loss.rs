use ndarray::{Array2, ArrayView2, Axis};

use crate::{Labels, MlError};

const EPS: f32 = 1e-12;

/// A loss function between a model's output and the batch labels.
pub trait LossFn: Send + Sync {
    /// Returns the loss of `y_pred` against `y`.
    ///
    /// # Errors
    /// Returns `MlError` if the label kind or shape does not fit the loss.
    fn loss(&self, y_pred: ArrayView2<f32>, y: &Labels) -> Result<f32, MlError>;

    /// Returns the gradient of the loss with respect to `y_pred`.
    ///
    /// # Errors
    /// Returns `MlError` if the label kind or shape does not fit the loss.
    fn loss_prime(&self, y_pred: ArrayView2<f32>, y: &Labels) -> Result<Array2<f32>, MlError>;
}

/// Mean squared error loss function.
#[derive(Debug, Default, Clone, Copy)]
pub struct Mse;

impl Mse {
    /// Returns a new `Mse`.
    pub fn new() -> Self {
        Self
    }

    fn targets_like(y_pred: ArrayView2<f32>, y: &Labels) -> Result<Array2<f32>, MlError> {
        let Labels::Continuous(y) = y else {
            return Err(MlError::InvalidInput("mse expects continuous targets"));
        };

        if y.len() != y_pred.len() {
            return Err(MlError::ShapeMismatch {
                what: "targets",
                got: y.len(),
                expected: y_pred.len(),
            });
        }

        Ok(Array2::from_shape_vec(y_pred.raw_dim(), y.iter().copied().collect())?)
    }
}

impl LossFn for Mse {
    fn loss(&self, y_pred: ArrayView2<f32>, y: &Labels) -> Result<f32, MlError> {
        let y = Self::targets_like(y_pred, y)?;
        Ok((&y_pred - &y).mapv(|x| x.powi(2)).mean().unwrap_or_default())
    }

    fn loss_prime(&self, y_pred: ArrayView2<f32>, y: &Labels) -> Result<Array2<f32>, MlError> {
        let y = Self::targets_like(y_pred, y)?;
        Ok((&y_pred - &y) * (2.0 / y_pred.len().max(1) as f32))
    }
}

/// Softmax cross entropy over raw scores, with class-index labels.
#[derive(Debug, Default, Clone, Copy)]
pub struct CrossEntropy;

impl CrossEntropy {
    /// Returns a new `CrossEntropy`.
    pub fn new() -> Self {
        Self
    }

    fn classes(y_pred: ArrayView2<f32>, y: &Labels) -> Result<Vec<usize>, MlError> {
        let Labels::Classes(classes) = y else {
            return Err(MlError::InvalidInput("cross entropy expects class labels"));
        };

        if classes.ndim() != 1 {
            return Err(MlError::ShapeMismatch {
                what: "class label rank",
                got: classes.ndim(),
                expected: 1,
            });
        }
        if classes.len() != y_pred.nrows() {
            return Err(MlError::ShapeMismatch {
                what: "class labels",
                got: classes.len(),
                expected: y_pred.nrows(),
            });
        }
        if let Some(&class) = classes.iter().find(|&&c| c >= y_pred.ncols()) {
            return Err(MlError::ShapeMismatch {
                what: "class index",
                got: class,
                expected: y_pred.ncols(),
            });
        }

        Ok(classes.iter().copied().collect())
    }
}

impl LossFn for CrossEntropy {
    fn loss(&self, y_pred: ArrayView2<f32>, y: &Labels) -> Result<f32, MlError> {
        let classes = Self::classes(y_pred, y)?;
        let probs = softmax_rows(y_pred);

        let total: f32 = classes
            .iter()
            .enumerate()
            .map(|(row, &class)| -probs[[row, class]].max(EPS).ln())
            .sum();

        Ok(total / classes.len().max(1) as f32)
    }

    fn loss_prime(&self, y_pred: ArrayView2<f32>, y: &Labels) -> Result<Array2<f32>, MlError> {
        let classes = Self::classes(y_pred, y)?;
        let mut d = softmax_rows(y_pred);

        for (row, &class) in classes.iter().enumerate() {
            d[[row, class]] -= 1.0;
        }

        Ok(d / classes.len().max(1) as f32)
    }
}

/// Row-wise numerically stable softmax.
pub fn softmax_rows(scores: ArrayView2<f32>) -> Array2<f32> {
    let mut out = scores.to_owned();

    for mut row in out.axis_iter_mut(Axis(0)) {
        let max = row.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        if sum > 0.0 {
            row /= sum;
        }
    }

    out
}

/// Index of the highest score of each row.
pub fn argmax_rows(scores: ArrayView2<f32>) -> Vec<usize> {
    scores
        .axis_iter(Axis(0))
        .map(|row| {
            row.iter()
                .enumerate()
                .fold((0, f32::NEG_INFINITY), |(best, max), (i, &v)| {
                    if v > max { (i, v) } else { (best, max) }
                })
                .0
        })
        .collect()
}
