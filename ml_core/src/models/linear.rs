use ndarray::{linalg, Array2, ArrayView1, ArrayView2, ArrayViewMut1, ArrayViewMut2, Axis};
use rand::Rng;

use crate::{MlError, Model, ModelInput};

/// A fully connected layer without activation, `x · W + b`.
///
/// Parameters are kept flat: the `in × out` weights in row-major order followed by the `out`
/// biases.
#[derive(Debug, Clone)]
pub struct Linear {
    dim: (usize, usize),
    params: Vec<f32>,
    grad: Vec<f32>,

    // Forward metadata
    x: Array2<f32>,
}

impl Linear {
    /// Creates a new `Linear` with uniform weights in `±sqrt(1 / in)` and zero biases.
    ///
    /// # Arguments
    /// * `dim` - The `(in, out)` dimensions of the layer.
    /// * `rng` - The random number generator used for the weights.
    pub fn new<R: Rng>(dim: (usize, usize), rng: &mut R) -> Self {
        let w_size = dim.0 * dim.1;
        let limit = (1.0 / dim.0.max(1) as f32).sqrt();
        let params = (0..w_size + dim.1)
            .map(|i| {
                if i < w_size {
                    rng.random_range(-limit..limit)
                } else {
                    0.0
                }
            })
            .collect();

        Self::with_params(dim, params)
    }

    /// Creates a new `Linear` from already laid out parameters.
    ///
    /// # Errors
    /// Returns `MlError::ShapeMismatch` if `params` does not hold `(in + 1) * out` values.
    pub fn from_params(dim: (usize, usize), params: Vec<f32>) -> Result<Self, MlError> {
        let expected = (dim.0 + 1) * dim.1;
        if params.len() != expected {
            return Err(MlError::ShapeMismatch {
                what: "linear params",
                got: params.len(),
                expected,
            });
        }

        Ok(Self::with_params(dim, params))
    }

    fn with_params(dim: (usize, usize), params: Vec<f32>) -> Self {
        Self {
            dim,
            grad: vec![0.0; params.len()],
            params,
            x: Array2::zeros((0, dim.0)),
        }
    }

    /// Returns the `(in, out)` dimensions.
    pub fn dim(&self) -> (usize, usize) {
        self.dim
    }

    pub(crate) fn forward_dense(&mut self, x: ArrayView2<f32>) -> Result<Array2<f32>, MlError> {
        self.check_features(x)?;

        let z = {
            let (w, b) = self.view_params()?;
            let mut z = x.dot(&w);
            z += &b;
            z
        };

        self.x = x.to_owned();
        Ok(z)
    }

    /// One per multiply-accumulate plus one per bias add.
    pub(crate) fn flops_for_rows(&self, rows: usize) -> u64 {
        let (n_in, n_out) = self.dim;
        (rows * (n_in * n_out + n_out)) as u64
    }

    fn check_features(&self, x: ArrayView2<f32>) -> Result<(), MlError> {
        if x.ncols() != self.dim.0 {
            return Err(MlError::ShapeMismatch {
                what: "input features",
                got: x.ncols(),
                expected: self.dim.0,
            });
        }

        Ok(())
    }

    /// Gives a view of the raw parameters as the weights and biases of this layer.
    fn view_params(&self) -> Result<(ArrayView2<'_, f32>, ArrayView1<'_, f32>), MlError> {
        let w_size = self.dim.0 * self.dim.1;
        let weights = ArrayView2::from_shape(self.dim, &self.params[..w_size])?;
        let biases = ArrayView1::from_shape(self.dim.1, &self.params[w_size..])?;
        Ok((weights, biases))
    }
}

impl Model for Linear {
    fn num_params(&self) -> usize {
        self.params.len()
    }

    fn forward(&mut self, input: ModelInput<'_>) -> Result<Array2<f32>, MlError> {
        match input {
            ModelInput::Dense(x) => self.forward_dense(x),
            ModelInput::Graph { .. } => {
                Err(MlError::InvalidInput("linear model expects dense input"))
            }
        }
    }

    fn backward(&mut self, d_out: ArrayView2<'_, f32>) -> Result<(), MlError> {
        if d_out.dim() != (self.x.nrows(), self.dim.1) {
            return Err(MlError::ShapeMismatch {
                what: "output gradient rows",
                got: d_out.nrows(),
                expected: self.x.nrows(),
            });
        }

        let w_size = self.dim.0 * self.dim.1;
        let (dw_raw, db_raw) = self.grad.split_at_mut(w_size);
        let mut dw = ArrayViewMut2::from_shape(self.dim, dw_raw)?;
        let mut db = ArrayViewMut1::from_shape(self.dim.1, db_raw)?;

        linalg::general_mat_mul(1.0, &self.x.t(), &d_out, 0.0, &mut dw);
        db.assign(&d_out.sum_axis(Axis(0)));
        Ok(())
    }

    fn params_and_grad(&mut self) -> (&mut [f32], &[f32]) {
        (&mut self.params, &self.grad)
    }

    fn flops(&self, input: ModelInput<'_>) -> Result<u64, MlError> {
        match input {
            ModelInput::Dense(x) => {
                self.check_features(x)?;
                Ok(self.flops_for_rows(x.nrows()))
            }
            ModelInput::Graph { .. } => Err(MlError::Unsupported("flop analysis of graph input")),
        }
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    fn identity_plus_one() -> Linear {
        Linear::from_params((2, 2), vec![1.0, 0.0, 0.0, 1.0, 1.0, 1.0]).unwrap()
    }

    #[test]
    fn forward_applies_weights_and_biases() {
        let mut model = identity_plus_one();
        let x = array![[1.0, 2.0], [3.0, 4.0]];
        let y = model.forward(ModelInput::Dense(x.view())).unwrap();
        assert_eq!(y, array![[2.0, 3.0], [4.0, 5.0]]);
    }

    #[test]
    fn backward_writes_weight_and_bias_gradients() {
        let mut model = identity_plus_one();
        let x = array![[1.0, 2.0], [3.0, 4.0]];
        model.forward(ModelInput::Dense(x.view())).unwrap();
        model.backward(array![[1.0, 0.0], [0.0, 1.0]].view()).unwrap();

        let (_, grad) = model.params_and_grad();
        // dW = x^T · d, db = column sums of d
        assert_eq!(grad, &[1.0, 3.0, 2.0, 4.0, 1.0, 1.0]);
    }

    #[test]
    fn wrong_feature_count_is_rejected() {
        let mut model = identity_plus_one();
        let x = array![[1.0, 2.0, 3.0]];
        assert!(matches!(
            model.forward(ModelInput::Dense(x.view())),
            Err(MlError::ShapeMismatch { got: 3, expected: 2, .. })
        ));
    }

    #[test]
    fn flops_scale_with_rows() {
        let model = identity_plus_one();
        let x = Array2::<f32>::zeros((5, 2));
        assert_eq!(model.flops(ModelInput::Dense(x.view())).unwrap(), 5 * (4 + 2));
    }

    #[test]
    fn new_has_expected_size() {
        let model = Linear::new((3, 4), &mut rand::rng());
        assert_eq!(model.num_params(), 16);
    }
}
