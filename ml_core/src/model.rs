use ndarray::{Array2, ArrayView2};

use crate::{MlError, ModelInput};

/// A trainable model over flat parameters.
///
/// A `Model` defines how to evaluate a batch, how to turn an output error signal into parameter
/// gradients, and optionally how expensive one evaluation is. It does not:
/// - access datasets,
/// - choose a loss function,
/// - implement training loops.
pub trait Model: Send {
    /// Returns the number of scalar parameters.
    fn num_params(&self) -> usize;

    /// Computes the model output for a batch, keeping whatever `backward` needs.
    ///
    /// # Errors
    /// Returns `MlError` if the input kind or shape is not accepted by the model.
    fn forward(&mut self, input: ModelInput<'_>) -> Result<Array2<f32>, MlError>;

    /// Writes the gradient of the loss with respect to the parameters, given `d_out`, the
    /// gradient with respect to the output of the last `forward` call.
    ///
    /// # Errors
    /// Returns `MlError` if `d_out` does not match the last output's shape.
    fn backward(&mut self, d_out: ArrayView2<'_, f32>) -> Result<(), MlError>;

    /// Borrows the parameters mutably alongside the gradient of the last `backward` call.
    fn params_and_grad(&mut self) -> (&mut [f32], &[f32]);

    /// Counts the floating point operations of one `forward` over `input`.
    ///
    /// # Errors
    /// Returns `MlError::Unsupported` when the model cannot be analyzed for this input.
    fn flops(&self, input: ModelInput<'_>) -> Result<u64, MlError> {
        let _ = input;
        Err(MlError::Unsupported("flop analysis"))
    }
}
