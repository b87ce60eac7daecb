use std::sync::Arc;

use client_data::{
    build_client_data, ClientData, Compose, CsvSource, DatasetSource, GaussianNoise, IidSplitter,
    LdaSplitter, Normalize, SplitMode, Splitter, SyntheticClassification, SyntheticGraph,
    SyntheticRegression, SyntheticShape, Transform, TransformPolicy,
};
use log::info;

use crate::{
    config::{SourceKind, SplitterKind},
    Config, DataRegistry, FedErr, Result,
};

/// Loads every client's data with the loader registered under `data.type`.
///
/// Returns the data together with a copy of `cfg` whose `federate.client_num` holds the
/// resolved client count. `cfg` itself is left untouched.
///
/// # Errors
/// Returns `FedErr::NoMatchingHandler` if no loader is registered under `data.type`, otherwise
/// the loader's error.
pub fn load_client_data(cfg: &Config) -> Result<(ClientData, Config)> {
    load_client_data_with(&DataRegistry::with_builtins(), cfg)
}

/// Same as `load_client_data`, looking the loader up in `registry`.
pub fn load_client_data_with(
    registry: &DataRegistry,
    cfg: &Config,
) -> Result<(ClientData, Config)> {
    let loader = registry.get(&cfg.data.kind)?;
    loader(cfg)
}

fn source(cfg: &Config) -> Box<dyn DatasetSource> {
    let data = &cfg.data;
    let shape = SyntheticShape {
        train: data.train_samples,
        test: data.test_samples,
        features: data.features,
    };
    let classes = cfg.model.out_channels;

    match data.source {
        SourceKind::SyntheticClassification => {
            Box::new(SyntheticClassification::new(shape, classes, cfg.seed))
        }
        SourceKind::SyntheticRegression => Box::new(SyntheticRegression::new(shape, cfg.seed)),
        SourceKind::SyntheticGraph => Box::new(SyntheticGraph::new(shape, classes, cfg.seed)),
        SourceKind::Csv => Box::new(CsvSource::new(&data.root)),
    }
}

fn splitter(cfg: &Config) -> Result<Box<dyn Splitter>> {
    let splitter: Box<dyn Splitter> = match cfg.data.splitter {
        SplitterKind::Iid => Box::new(IidSplitter::new(cfg.seed, true)),
        SplitterKind::Lda => Box::new(LdaSplitter::new(cfg.data.alpha, cfg.seed)?),
    };
    Ok(splitter)
}

fn transform_policy(cfg: &Config) -> Result<TransformPolicy> {
    let normalize: Arc<dyn Transform> = Arc::new(Normalize::new(cfg.data.mean, cfg.data.std)?);
    let noise: Arc<dyn Transform> = Arc::new(GaussianNoise::new(cfg.data.noise_std)?);

    Ok(TransformPolicy {
        augment: Arc::new(Compose::new(vec![normalize.clone(), noise])),
        deterministic: normalize,
    })
}

/// Loader registered for the split modes: reads the source, partitions it following the mode
/// named by `data.type` and builds one bundle per client.
pub(crate) fn load_split_mode(cfg: &Config) -> Result<(ClientData, Config)> {
    let mode = SplitMode::from_name(&cfg.data.kind).ok_or_else(|| FedErr::NoMatchingHandler {
        kind: "split mode",
        name: cfg.data.kind.clone(),
    })?;

    let splits = source(cfg).load()?;
    let shards = mode.assemble(
        splits.train,
        splits.test,
        splitter(cfg)?.as_ref(),
        cfg.num_shards()?,
        &transform_policy(cfg)?,
    )?;

    let data = build_client_data(
        shards.train,
        shards.val,
        shards.test,
        &cfg.loader_spec()?,
        cfg.federate.client_num,
    )?;

    let resolved = cfg.with_client_num(data.client_num());
    info!(
        mode = mode.name(),
        requested = cfg.federate.client_num,
        resolved = resolved.federate.client_num;
        "client data loaded"
    );

    Ok((data, resolved))
}
