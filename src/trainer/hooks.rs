use std::{any::Any, ops::AddAssign, sync::Arc};

use log::{debug, warn};
use ml_core::{argmax_rows, Batch, Labels};
use ndarray::Array2;

use super::{Metric, RoutineReport, Split, TrainerVariant};
use crate::{
    context::{vars, Context, Lifecycle},
    FedErr, FlopEstimate, Result,
};

/// One step of the pipeline, run against the context.
pub trait Hook: Send {
    fn run(&mut self, ctx: &mut Context) -> Result<()>;
}

impl<F> Hook for F
where
    F: FnMut(&mut Context) -> Result<()> + Send,
{
    fn run(&mut self, ctx: &mut Context) -> Result<()> {
        self(ctx)
    }
}

/// Does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct Noop;

impl Hook for Noop {
    fn run(&mut self, _ctx: &mut Context) -> Result<()> {
        Ok(())
    }
}

fn add<T: Any + Send + AddAssign>(ctx: &mut Context, key: &'static str, value: T) -> Result<()> {
    *ctx.var_mut::<T>(key).ok_or(FedErr::MissingVar(key))? += value;
    Ok(())
}

/// Resets the routine accumulators.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoutineStart;

impl Hook for RoutineStart {
    fn run(&mut self, ctx: &mut Context) -> Result<()> {
        ctx.set_var(vars::NUM_SAMPLES, 0_usize, Lifecycle::Routine);
        ctx.set_var(vars::LOSS_TOTAL, 0.0_f64, Lifecycle::Routine);
        ctx.set_var(vars::NUM_CORRECT, 0_usize, Lifecycle::Routine);
        ctx.set_var(vars::SQUARED_ERROR, 0.0_f64, Lifecycle::Routine);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EpochStart;

impl Hook for EpochStart {
    fn run(&mut self, ctx: &mut Context) -> Result<()> {
        ctx.set_var(vars::EPOCH_LOSS, 0.0_f64, Lifecycle::Epoch);
        ctx.set_var(vars::EPOCH_SAMPLES, 0_usize, Lifecycle::Epoch);
        Ok(())
    }
}

/// Runs the model on the current batch and publishes the loss, the labels and the predictions.
pub struct Forward {
    variant: Arc<dyn TrainerVariant>,
}

impl Forward {
    pub fn new(variant: Arc<dyn TrainerVariant>) -> Self {
        Self { variant }
    }
}

impl Hook for Forward {
    fn run(&mut self, ctx: &mut Context) -> Result<()> {
        let batch = ctx.require::<Batch>(vars::DATA_BATCH)?.clone().to(ctx.device);
        let y_prob = ctx.model.forward(self.variant.forward_input(&batch)?)?;

        let y_true = if ctx.cfg.model.is_regression() {
            Labels::regression(batch.targets())
        } else {
            Labels::classification(batch.targets())?
        };
        let loss = ctx.loss_fn.loss(y_prob.view(), &y_true)?;

        ctx.set_var(vars::LOSS_BATCH, loss, Lifecycle::Batch);
        ctx.set_var(vars::BATCH_SIZE, y_true.len(), Lifecycle::Batch);
        ctx.set_var(vars::Y_TRUE, y_true, Lifecycle::Batch);
        ctx.set_var(vars::Y_PROB, y_prob, Lifecycle::Batch);
        Ok(())
    }
}

/// Measures the per-sample FLOPs once per run and accumulates the total every batch.
///
/// A failed measurement disables counting for the rest of the run. The total keeps being
/// accumulated with the disabled estimate's sentinel.
pub struct FlopCount {
    variant: Arc<dyn TrainerVariant>,
}

impl FlopCount {
    pub fn new(variant: Arc<dyn TrainerVariant>) -> Self {
        Self { variant }
    }

    fn measure(&self, ctx: &Context) -> Result<f64> {
        let batch = ctx.require::<Batch>(vars::DATA_BATCH)?.clone().to(ctx.device);
        let mut flops = self.variant.measure_flops(ctx.model.as_ref(), &batch)? as f64;

        if ctx.model_nums > 1 && ctx.mirrored_models {
            flops *= ctx.model_nums as f64;
        }

        Ok(flops)
    }
}

impl Hook for FlopCount {
    fn run(&mut self, ctx: &mut Context) -> Result<()> {
        let batch_size = *ctx.require::<usize>(vars::BATCH_SIZE)?;

        let unmeasured = ctx.monitor.flops_per_sample() == FlopEstimate::Unmeasured;
        if ctx.cfg.eval.count_flops && unmeasured {
            match self.measure(ctx) {
                Ok(flops) => ctx.monitor.track_avg_flops(flops, batch_size),
                Err(e) => {
                    let trainer = self.variant.name();
                    warn!("{trainer} cannot count flops, disabled for the rest of the run: {e}");
                    ctx.monitor.disable_flops();
                }
            }
        }

        ctx.monitor.accumulate_flops(batch_size);
        Ok(())
    }
}

/// Back-propagates the batch loss and takes an optimizer step.
#[derive(Debug, Clone, Copy, Default)]
pub struct Backward;

impl Hook for Backward {
    fn run(&mut self, ctx: &mut Context) -> Result<()> {
        let d_out = {
            let y_prob = ctx.require::<Array2<f32>>(vars::Y_PROB)?;
            let y_true = ctx.require::<Labels>(vars::Y_TRUE)?;
            ctx.loss_fn.loss_prime(y_prob.view(), y_true)?
        };

        ctx.model.backward(d_out.view())?;
        let (params, grad) = ctx.model.params_and_grad();
        ctx.optimizer.update_params(grad, params)?;
        Ok(())
    }
}

/// Folds the batch into the epoch and routine accumulators.
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchEnd;

impl BatchEnd {
    fn scores(y_prob: &Array2<f32>, y_true: &Labels) -> (usize, f64) {
        match y_true {
            Labels::Classes(classes) => {
                let correct = argmax_rows(y_prob.view())
                    .into_iter()
                    .zip(classes.iter())
                    .filter(|(pred, class)| pred == *class)
                    .count();
                (correct, 0.0)
            }
            Labels::Continuous(targets) => {
                let se = y_prob
                    .iter()
                    .zip(targets.iter())
                    .map(|(p, t)| f64::from(p - t).powi(2))
                    .sum();
                (0, se)
            }
        }
    }
}

impl Hook for BatchEnd {
    fn run(&mut self, ctx: &mut Context) -> Result<()> {
        let batch_size = *ctx.require::<usize>(vars::BATCH_SIZE)?;
        let loss = f64::from(*ctx.require::<f32>(vars::LOSS_BATCH)?);
        let (correct, se) = Self::scores(
            ctx.require::<Array2<f32>>(vars::Y_PROB)?,
            ctx.require::<Labels>(vars::Y_TRUE)?,
        );

        add(ctx, vars::EPOCH_LOSS, loss * batch_size as f64)?;
        add(ctx, vars::EPOCH_SAMPLES, batch_size)?;
        add(ctx, vars::NUM_SAMPLES, batch_size)?;
        add(ctx, vars::LOSS_TOTAL, loss * batch_size as f64)?;
        add(ctx, vars::NUM_CORRECT, correct)?;
        add(ctx, vars::SQUARED_ERROR, se)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EpochEnd;

impl Hook for EpochEnd {
    fn run(&mut self, ctx: &mut Context) -> Result<()> {
        let loss = *ctx.require::<f64>(vars::EPOCH_LOSS)?;
        let samples = *ctx.require::<usize>(vars::EPOCH_SAMPLES)?;
        let split = *ctx.require::<Split>(vars::SPLIT)?;

        debug!(
            split = split.as_str(),
            samples = samples,
            avg_loss = loss / samples.max(1) as f64;
            "epoch finished"
        );
        Ok(())
    }
}

/// Publishes the routine's `RoutineReport`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoutineEnd;

impl Hook for RoutineEnd {
    fn run(&mut self, ctx: &mut Context) -> Result<()> {
        let split = *ctx.require::<Split>(vars::SPLIT)?;
        let num_samples = *ctx.require::<usize>(vars::NUM_SAMPLES)?;
        let loss_total = *ctx.require::<f64>(vars::LOSS_TOTAL)?;
        let denom = num_samples.max(1) as f64;

        let metric = if ctx.cfg.model.is_regression() {
            Metric::Mse(*ctx.require::<f64>(vars::SQUARED_ERROR)? / denom)
        } else {
            Metric::Accuracy(*ctx.require::<usize>(vars::NUM_CORRECT)? as f64 / denom)
        };

        let report = RoutineReport {
            split,
            num_samples,
            avg_loss: loss_total / denom,
            metric,
            total_flops: ctx.monitor.reported_total_flops(),
        };
        ctx.set_var(vars::REPORT, report, Lifecycle::Routine);
        Ok(())
    }
}
