use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use client_data::{ClientBundle, DataErr};
use log::{info, warn};
use ml_core::{
    models::{GraphConv, Linear},
    CrossEntropy, Dataset, GradientDescent, LossFn, Model, Mse, Sample,
};
use rand::{rngs::StdRng, SeedableRng};

use crate::{
    data::load_client_data_with,
    trainer::{Pipeline, RoutineReport, Split, Trainer},
    Config, Context, DataRegistry, Result, TrainerRegistry,
};

/// The reports of one client's local run.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientReport {
    pub client_id: usize,
    pub train: RoutineReport,
    pub val: RoutineReport,
    pub test: RoutineReport,
}

/// Runs every client's local training and evaluation, one client after the other.
#[derive(Debug)]
pub struct Runner {
    data: DataRegistry,
    trainers: TrainerRegistry,
    stop: Arc<AtomicBool>,
}

impl Default for Runner {
    fn default() -> Self {
        Self::new(DataRegistry::with_builtins(), TrainerRegistry::with_builtins())
    }
}

impl Runner {
    pub fn new(data: DataRegistry, trainers: TrainerRegistry) -> Self {
        Self {
            data,
            trainers,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns a flag that, once raised, stops the run before the next client starts.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    /// Loads the client data and runs every client in ascending id order.
    ///
    /// # Returns
    /// One report per client that ran.
    ///
    /// # Errors
    /// The first data, model or lookup error stops the run.
    pub fn run(&self, cfg: &Config) -> Result<Vec<ClientReport>> {
        let variant = self.trainers.get(&cfg.trainer.kind)?(cfg);
        let (data, cfg) = load_client_data_with(&self.data, cfg)?;

        info!(
            clients = cfg.federate.client_num,
            trainer = variant.name();
            "starting run"
        );

        let mut reports = Vec::with_capacity(data.client_num());
        for bundle in data.into_bundles() {
            if self.stop.load(Ordering::Relaxed) {
                warn!("run stopped before client {}", bundle.client_id);
                break;
            }

            let client_id = bundle.client_id;
            let ctx = build_context(&cfg, &bundle)?;
            let mut trainer = Trainer::new(ctx, Pipeline::new(variant.clone()), bundle);

            let report = ClientReport {
                client_id,
                train: trainer.train()?,
                val: trainer.evaluate(Split::Val)?,
                test: trainer.evaluate(Split::Test)?,
            };

            info!(
                client_id = client_id,
                train_loss = report.train.avg_loss,
                val_loss = report.val.avg_loss,
                test_loss = report.test.avg_loss;
                "client finished"
            );
            reports.push(report);
        }

        Ok(reports)
    }
}

/// Builds a fresh context for one client. The model is sized from the client's first train
/// sample: a dense sample gets a linear model, a graph sample a graph convolution.
fn build_context(cfg: &Config, bundle: &ClientBundle) -> Result<Context> {
    let sample = bundle.train.shard().get(0).map_err(DataErr::from)?;
    let regression = cfg.model.is_regression();

    let out = if regression {
        sample.target().len().max(1)
    } else {
        cfg.model.out_channels
    };

    let mut rng = StdRng::seed_from_u64(cfg.seed.wrapping_add(bundle.client_id as u64));
    let model: Box<dyn Model> = match &sample {
        Sample::Dense { x, .. } => Box::new(Linear::new((x.len(), out), &mut rng)),
        Sample::Graph { x, .. } => Box::new(GraphConv::new(x.ncols(), out, &mut rng)),
    };

    let loss_fn: Box<dyn LossFn> = if regression {
        Box::new(Mse::new())
    } else {
        Box::new(CrossEntropy::new())
    };

    Ok(Context::new(
        cfg.clone(),
        model,
        loss_fn,
        Box::new(GradientDescent::new(cfg.train.lr)),
    ))
}
