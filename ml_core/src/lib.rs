mod batch;
mod data;
mod error;
mod labels;
mod loss;
mod model;
pub mod models;
mod optimizer;

pub use batch::{Batch, Device, ModelInput, Sample};
pub use data::{DataError, Dataset};
pub use error::MlError;
pub use labels::Labels;
pub use loss::{argmax_rows, softmax_rows, CrossEntropy, LossFn, Mse};
pub use model::Model;
pub use optimizer::{GradientDescent, Optimizer};
