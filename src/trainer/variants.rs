use ml_core::{Batch, MlError, Model, ModelInput};

use super::Pipeline;
use crate::Result;

/// What distinguishes one trainer from another: how a batch is fed to the model, how its cost
/// is measured, and which pipeline steps it replaces.
pub trait TrainerVariant: Send + Sync {
    fn name(&self) -> &'static str;

    /// Extracts the model input from `batch`.
    ///
    /// # Errors
    /// Returns an error if the variant cannot feed this kind of batch.
    fn forward_input<'a>(&self, batch: &'a Batch) -> Result<ModelInput<'a>>;

    /// Counts the floating point operations of one forward pass over `batch`.
    ///
    /// # Errors
    /// Any error disables FLOP counting for the rest of the run.
    fn measure_flops(&self, model: &dyn Model, batch: &Batch) -> Result<u64> {
        Ok(model.flops(self.forward_input(batch)?)?)
    }

    /// Replaces pipeline steps. Called once, after the default hooks are installed.
    fn configure(&self, pipeline: &mut Pipeline) {
        let _ = pipeline;
    }
}

/// Feeds whatever the batch holds to the model.
#[derive(Debug, Clone, Copy, Default)]
pub struct General;

impl General {
    pub const NAME: &'static str = "general";
}

impl TrainerVariant for General {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn forward_input<'a>(&self, batch: &'a Batch) -> Result<ModelInput<'a>> {
        Ok(batch.input())
    }
}

/// Trains graph-level models on mini-batches of graphs.
///
/// FLOP analysis traces the model on the batch's node features and edge index, so it only
/// succeeds on graph batches.
#[derive(Debug, Clone, Copy, Default)]
pub struct GraphMiniBatch;

impl GraphMiniBatch {
    pub const NAME: &'static str = "graphminibatch_trainer";
}

impl TrainerVariant for GraphMiniBatch {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn forward_input<'a>(&self, batch: &'a Batch) -> Result<ModelInput<'a>> {
        match batch {
            Batch::Graph { .. } => Ok(batch.input()),
            Batch::Dense { .. } => {
                Err(MlError::InvalidInput("graph trainer expects graph batches").into())
            }
        }
    }

    fn measure_flops(&self, model: &dyn Model, batch: &Batch) -> Result<u64> {
        let Batch::Graph { .. } = batch else {
            return Err(MlError::Unsupported("flop analysis of non-graph batches").into());
        };
        Ok(model.flops(batch.input())?)
    }
}
