use std::{collections::BTreeMap, fmt, sync::Arc};

use client_data::{ClientData, SplitMode};

use crate::{
    data,
    trainer::{General, GraphMiniBatch, TrainerVariant},
    Config, FedErr, Result,
};

/// Loads every client's data and returns it with the resolved config.
pub type DataLoaderFn = fn(&Config) -> Result<(ClientData, Config)>;

/// Builds a trainer variant.
pub type TrainerFn = fn(&Config) -> Arc<dyn TrainerVariant>;

/// Factories looked up by name at configuration time.
pub struct Registry<F> {
    kind: &'static str,
    factories: BTreeMap<String, F>,
}

pub type DataRegistry = Registry<DataLoaderFn>;
pub type TrainerRegistry = Registry<TrainerFn>;

impl<F> Registry<F> {
    /// Creates an empty registry. `kind` names what it holds in lookup errors.
    pub fn new(kind: &'static str) -> Self {
        Self {
            kind,
            factories: BTreeMap::new(),
        }
    }

    /// Registers `factory` under `name` and returns the factory it replaces, if any.
    pub fn register(&mut self, name: impl Into<String>, factory: F) -> Option<F> {
        self.factories.insert(name.into(), factory)
    }

    /// Returns the factory registered under `name`.
    ///
    /// # Errors
    /// Returns `FedErr::NoMatchingHandler` if nothing is registered under `name`.
    pub fn get(&self, name: &str) -> Result<&F> {
        self.factories
            .get(name)
            .ok_or_else(|| FedErr::NoMatchingHandler {
                kind: self.kind,
                name: name.to_string(),
            })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }
}

impl<F> fmt::Debug for Registry<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("kind", &self.kind)
            .field("names", &self.names().collect::<Vec<_>>())
            .finish()
    }
}

fn general(_: &Config) -> Arc<dyn TrainerVariant> {
    Arc::new(General)
}

fn graph_mini_batch(_: &Config) -> Arc<dyn TrainerVariant> {
    Arc::new(GraphMiniBatch)
}

impl Registry<DataLoaderFn> {
    /// Returns a registry holding the split mode loaders.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new("data loader");
        registry.register(SplitMode::CONTRASTIVE, data::load_split_mode as DataLoaderFn);
        registry.register(SplitMode::LINEAR_PROBE, data::load_split_mode as DataLoaderFn);
        registry
    }
}

impl Registry<TrainerFn> {
    /// Returns a registry holding the general and graph mini-batch trainers.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new("trainer");
        registry.register(General::NAME, general as TrainerFn);
        registry.register(GraphMiniBatch::NAME, graph_mini_batch as TrainerFn);
        registry
    }
}
