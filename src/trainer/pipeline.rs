use std::{collections::BTreeMap, fmt, sync::Arc};

use super::{
    hooks::{
        Backward, BatchEnd, EpochEnd, EpochStart, FlopCount, Forward, Hook, Noop, RoutineEnd,
        RoutineStart,
    },
    TrainerVariant,
};
use crate::{Context, Result};

/// A named step of the pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Step {
    FitStart,
    EpochStart,
    BatchStart,
    BatchForward,
    BatchFlopCount,
    BatchBackward,
    BatchEnd,
    EpochEnd,
    FitEnd,
}

impl Step {
    /// The steps run for every batch, in order.
    pub const BATCH: [Step; 5] = [
        Step::BatchStart,
        Step::BatchForward,
        Step::BatchFlopCount,
        Step::BatchBackward,
        Step::BatchEnd,
    ];

    /// Returns `true` if the step only runs while training.
    pub fn train_only(self) -> bool {
        matches!(self, Step::BatchBackward)
    }
}

/// Maps every step to the hook implementing it.
///
/// The defaults are installed first, then the variant may replace any of them.
pub struct Pipeline {
    hooks: BTreeMap<Step, Box<dyn Hook>>,
    variant: Arc<dyn TrainerVariant>,
}

impl Pipeline {
    pub fn new(variant: Arc<dyn TrainerVariant>) -> Self {
        let mut hooks: BTreeMap<Step, Box<dyn Hook>> = BTreeMap::new();
        hooks.insert(Step::FitStart, Box::new(RoutineStart));
        hooks.insert(Step::EpochStart, Box::new(EpochStart));
        hooks.insert(Step::BatchStart, Box::new(Noop));
        hooks.insert(Step::BatchForward, Box::new(Forward::new(variant.clone())));
        hooks.insert(Step::BatchFlopCount, Box::new(FlopCount::new(variant.clone())));
        hooks.insert(Step::BatchBackward, Box::new(Backward));
        hooks.insert(Step::BatchEnd, Box::new(BatchEnd));
        hooks.insert(Step::EpochEnd, Box::new(EpochEnd));
        hooks.insert(Step::FitEnd, Box::new(RoutineEnd));

        let mut pipeline = Self {
            hooks,
            variant: variant.clone(),
        };
        variant.configure(&mut pipeline);
        pipeline
    }

    #[inline]
    pub fn variant(&self) -> &dyn TrainerVariant {
        self.variant.as_ref()
    }

    /// Installs `hook` for `step` and returns the hook it replaces.
    pub fn replace(&mut self, step: Step, hook: Box<dyn Hook>) -> Option<Box<dyn Hook>> {
        self.hooks.insert(step, hook)
    }

    /// Runs the hook installed for `step`.
    ///
    /// # Errors
    /// Propagates the hook's error.
    pub fn run(&mut self, step: Step, ctx: &mut Context) -> Result<()> {
        match self.hooks.get_mut(&step) {
            Some(hook) => hook.run(ctx),
            None => Ok(()),
        }
    }

    /// Runs the batch steps in order, skipping train-only steps unless `training`.
    pub fn run_batch(&mut self, ctx: &mut Context, training: bool) -> Result<()> {
        for step in Step::BATCH {
            if step.train_only() && !training {
                continue;
            }
            self.run(step, ctx)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("variant", &self.variant.name())
            .field("steps", &self.hooks.keys().collect::<Vec<_>>())
            .finish()
    }
}
