mod hooks;
mod pipeline;
mod variants;

use std::fmt;

use client_data::{ClientBundle, DataLoader};
use log::info;

pub use hooks::{
    Backward, BatchEnd, EpochEnd, EpochStart, FlopCount, Forward, Hook, Noop, RoutineEnd,
    RoutineStart,
};
pub use pipeline::{Pipeline, Step};
pub use variants::{General, GraphMiniBatch, TrainerVariant};

use crate::{
    context::{vars, Lifecycle},
    Context, Result,
};

/// Which loader a routine consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Train,
    Val,
    Test,
}

impl Split {
    pub fn as_str(self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Val => "val",
            Split::Test => "test",
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Quality of the predictions over a routine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Metric {
    Accuracy(f64),
    Mse(f64),
}

/// Summary of one train or evaluation routine.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutineReport {
    pub split: Split,
    pub num_samples: usize,
    pub avg_loss: f64,
    pub metric: Metric,
    /// `None` once FLOP counting has been disabled.
    pub total_flops: Option<f64>,
}

/// Drives one client's routines through the pipeline.
///
/// Stages nest as routine, epoch, batch. Batch variables are cleared before every batch is
/// published and after the last one, epoch variables after each epoch and routine variables
/// once the report has been read.
pub struct Trainer {
    ctx: Context,
    pipeline: Pipeline,
    bundle: ClientBundle,
    train_epochs: u64,
}

impl Trainer {
    pub fn new(ctx: Context, pipeline: Pipeline, bundle: ClientBundle) -> Self {
        Self {
            ctx,
            pipeline,
            bundle,
            train_epochs: 0,
        }
    }

    #[inline]
    pub fn ctx(&self) -> &Context {
        &self.ctx
    }

    #[inline]
    pub fn client_id(&self) -> usize {
        self.bundle.client_id
    }

    /// Runs `train.local_update_steps` epochs over the train loader.
    ///
    /// # Errors
    /// Any data, model or hook error aborts the routine.
    pub fn train(&mut self) -> Result<RoutineReport> {
        let epochs = self.ctx.cfg.train.local_update_steps;
        self.run_routine(Split::Train, epochs)
    }

    /// Runs one epoch over the `split` loader without updating the model.
    ///
    /// # Errors
    /// Any data, model or hook error aborts the routine.
    pub fn evaluate(&mut self, split: Split) -> Result<RoutineReport> {
        self.run_routine(split, 1)
    }

    fn run_routine(&mut self, split: Split, epochs: usize) -> Result<RoutineReport> {
        let Self {
            ctx,
            pipeline,
            bundle,
            train_epochs,
        } = self;

        let loader: &DataLoader = match split {
            Split::Train => &bundle.train,
            Split::Val => &bundle.val,
            Split::Test => &bundle.test,
        };
        let training = split == Split::Train;

        ctx.set_var(vars::SPLIT, split, Lifecycle::Routine);
        pipeline.run(Step::FitStart, ctx)?;

        for _ in 0..epochs {
            let epoch = if training { *train_epochs } else { 0 };
            pipeline.run(Step::EpochStart, ctx)?;

            for batch in loader.iter(epoch) {
                let batch = batch?;
                ctx.clear(Lifecycle::Batch);
                ctx.set_var(vars::DATA_BATCH, batch, Lifecycle::Batch);
                pipeline.run_batch(ctx, training)?;
            }
            ctx.clear(Lifecycle::Batch);

            pipeline.run(Step::EpochEnd, ctx)?;
            ctx.clear(Lifecycle::Epoch);

            if training {
                *train_epochs += 1;
            }
        }

        pipeline.run(Step::FitEnd, ctx)?;
        let report = ctx.require::<RoutineReport>(vars::REPORT)?.clone();
        ctx.clear(Lifecycle::Routine);

        info!(
            client_id = bundle.client_id,
            split = split.as_str(),
            samples = report.num_samples,
            avg_loss = report.avg_loss;
            "routine finished"
        );

        Ok(report)
    }
}

impl fmt::Debug for Trainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trainer")
            .field("client_id", &self.bundle.client_id)
            .field("pipeline", &self.pipeline)
            .field("train_epochs", &self.train_epochs)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        num::NonZeroUsize,
        sync::{Arc, Mutex},
    };

    use client_data::{
        build_client_data, Identity, InMemoryDataset, LoaderSpec, Shard, SplitShards,
    };
    use ml_core::{models::Linear, CrossEntropy, Dataset, GradientDescent, Labels, Sample};
    use ndarray::Array2;

    use super::*;
    use crate::{Config, FedErr};

    fn bundle(len: usize, batch_size: usize) -> ClientBundle {
        let samples = (0..len)
            .map(|i| Sample::dense(vec![i as f32, 1.0], (i % 2) as f32))
            .collect();
        let ds: Arc<dyn Dataset> = Arc::new(InMemoryDataset::new(samples));
        let split = || {
            let shard = Shard::new(ds.clone(), (0..len).collect());
            SplitShards::new(vec![shard], Arc::new(Identity))
        };

        let spec = LoaderSpec {
            batch_size: NonZeroUsize::new(batch_size).unwrap(),
            shuffle: true,
            num_workers: 0,
            seed: 0,
        };
        build_client_data(split(), split(), split(), &spec, 1)
            .unwrap()
            .into_bundles()
            .next()
            .unwrap()
    }

    fn context(cfg: Config) -> Context {
        let model = Linear::from_params((2, 2), vec![0.0; 6]).unwrap();
        Context::new(
            cfg,
            Box::new(model),
            Box::new(CrossEntropy::new()),
            Box::new(GradientDescent::new(0.1)),
        )
    }

    fn trainer(len: usize, batch_size: usize) -> Trainer {
        Trainer::new(
            context(Config::default()),
            Pipeline::new(Arc::new(General)),
            bundle(len, batch_size),
        )
    }

    #[test]
    fn train_reports_every_sample_and_clears_its_variables() {
        let mut trainer = trainer(10, 4);
        let report = trainer.train().unwrap();

        assert_eq!(report.split, Split::Train);
        assert_eq!(report.num_samples, 10);
        assert!(report.avg_loss.is_finite());
        assert!(trainer.ctx().vars().is_empty());
    }

    #[test]
    fn training_moves_parameters_but_evaluation_does_not() {
        let mut trainer = trainer(8, 4);

        let before = trainer.ctx.model.params_and_grad().0.to_vec();
        trainer.evaluate(Split::Val).unwrap();
        assert_eq!(trainer.ctx.model.params_and_grad().0, before.as_slice());

        trainer.train().unwrap();
        assert_ne!(trainer.ctx.model.params_and_grad().0, before.as_slice());
    }

    #[test]
    fn batch_variables_never_leak_into_the_next_batch() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut trainer = trainer(6, 2);

        let log = seen.clone();
        trainer.pipeline.replace(
            Step::BatchStart,
            Box::new(move |ctx: &mut Context| {
                log.lock().unwrap().push((
                    ctx.var::<Array2<f32>>(vars::Y_PROB).is_some(),
                    ctx.var::<Labels>(vars::Y_TRUE).is_some(),
                ));
                Ok(())
            }),
        );

        trainer.train().unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![(false, false); 3]);
    }

    #[test]
    fn replaced_steps_run_instead_of_the_defaults() {
        let mut trainer = trainer(4, 2);
        trainer.pipeline.replace(
            Step::BatchForward,
            Box::new(|_: &mut Context| -> crate::Result<()> { Err(FedErr::MissingVar("boom")) }),
        );

        assert!(matches!(trainer.train(), Err(FedErr::MissingVar("boom"))));
    }
}
