use std::{fmt, num::NonZeroUsize, sync::Arc};

use log::debug;
use ml_core::Dataset;

use crate::{Result, SplitShards, Splitter, Transform};

/// The transforms a mode hands out to its splits.
#[derive(Debug, Clone)]
pub struct TransformPolicy {
    /// Stochastic view generation used for training.
    pub augment: Arc<dyn Transform>,
    /// Reproducible preprocessing used for evaluation.
    pub deterministic: Arc<dyn Transform>,
}

/// The per-split shards one mode produced, ready for `build_client_data`.
#[derive(Debug, Clone)]
pub struct ModeShards {
    pub train: SplitShards,
    pub val: SplitShards,
    pub test: SplitShards,
}

/// How train, val and test shards are derived from the train and test datasets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitMode {
    /// Representation learning. Every split uses the augmentation, and val reuses the train
    /// shards verbatim.
    Contrastive,
    /// Linear probing. Val is an independent split of the train dataset, drawn from its own
    /// splitter stream, and test a split of the test dataset. Only train is augmented.
    LinearProbe,
}

impl SplitMode {
    /// Splitter stream of the linear probe's val partition.
    const VAL_STREAM: u64 = 1;

    pub const CONTRASTIVE: &'static str = "ModeA";
    pub const LINEAR_PROBE: &'static str = "ModeB";

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            Self::CONTRASTIVE => Some(Self::Contrastive),
            Self::LINEAR_PROBE => Some(Self::LinearProbe),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Contrastive => Self::CONTRASTIVE,
            Self::LinearProbe => Self::LINEAR_PROBE,
        }
    }

    /// Splits `train_set` and `test_set` into per-client shards following this mode.
    ///
    /// # Errors
    /// Propagates the splitter's errors.
    pub fn assemble(
        self,
        train_set: Arc<dyn Dataset>,
        test_set: Arc<dyn Dataset>,
        splitter: &dyn Splitter,
        num_shards: NonZeroUsize,
        policy: &TransformPolicy,
    ) -> Result<ModeShards> {
        let train = splitter.split(train_set.clone(), num_shards)?;
        let test = splitter.split(test_set, num_shards)?;

        let shards = match self {
            Self::Contrastive => ModeShards {
                val: SplitShards::new(train.clone(), policy.augment.clone()),
                train: SplitShards::new(train, policy.augment.clone()),
                test: SplitShards::new(test, policy.augment.clone()),
            },
            Self::LinearProbe => ModeShards {
                train: SplitShards::new(train, policy.augment.clone()),
                val: SplitShards::new(
                    splitter.split_stream(train_set, num_shards, Self::VAL_STREAM)?,
                    policy.deterministic.clone(),
                ),
                test: SplitShards::new(test, policy.deterministic.clone()),
            },
        };

        debug!(
            mode = self.name(),
            train = shards.train.shards.len(),
            val = shards.val.shards.len(),
            test = shards.test.shards.len();
            "shards assembled"
        );

        Ok(shards)
    }
}

impl fmt::Display for SplitMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
