use crate::MlError;

/// Turns the gradient of the last backward pass into a parameter step.
pub trait Optimizer: Send {
    /// Steps `params` in place using `grad`.
    ///
    /// # Errors
    /// Returns `MlError::ShapeMismatch` if `grad` and `params` differ in length.
    fn update_params(&mut self, grad: &[f32], params: &mut [f32]) -> Result<(), MlError>;
}

/// Plain SGD: `p -= lr * g`.
#[derive(Debug, Clone, Copy)]
pub struct GradientDescent {
    lr: f32,
}

impl GradientDescent {
    pub fn new(lr: f32) -> Self {
        Self { lr }
    }

    #[inline]
    pub fn lr(&self) -> f32 {
        self.lr
    }
}

impl Optimizer for GradientDescent {
    fn update_params(&mut self, grad: &[f32], params: &mut [f32]) -> Result<(), MlError> {
        if grad.len() != params.len() {
            return Err(MlError::ShapeMismatch {
                what: "gradient",
                got: grad.len(),
                expected: params.len(),
            });
        }

        params
            .iter_mut()
            .zip(grad)
            .for_each(|(p, g)| *p -= self.lr * g);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn steps_against_the_gradient() {
        let mut params = [1.0, -1.0];
        GradientDescent::new(0.5)
            .update_params(&[2.0, -2.0], &mut params)
            .unwrap();
        assert_eq!(params, [0.0, 0.0]);
    }

    #[test]
    fn length_mismatch_fails() {
        let mut params = [1.0];
        assert!(GradientDescent::new(0.1)
            .update_params(&[1.0, 2.0], &mut params)
            .is_err());
    }
}
