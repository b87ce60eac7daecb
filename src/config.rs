use std::{
    fs,
    num::NonZeroUsize,
    path::{Path, PathBuf},
};

use client_data::LoaderSpec;
use ml_core::Device;
use serde::{Deserialize, Serialize};

use crate::{FedErr, Result};

/// Where the centralized datasets come from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    #[default]
    SyntheticClassification,
    SyntheticRegression,
    SyntheticGraph,
    Csv,
}

/// How a dataset is partitioned among clients.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitterKind {
    #[default]
    Iid,
    Lda,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub root: PathBuf,
    /// Name of the registered data loader (`ModeA`, `ModeB`).
    #[serde(rename = "type")]
    pub kind: String,
    pub source: SourceKind,
    pub batch_size: usize,
    pub shuffle: bool,
    pub num_workers: usize,
    pub splitter: SplitterKind,
    /// Dirichlet concentration of the `lda` splitter.
    pub alpha: f64,
    /// Shards to cut when `federate.client_num` is 0.
    pub num_shards: usize,
    pub train_samples: usize,
    pub test_samples: usize,
    pub features: usize,
    /// Normalization applied to every split: `(x - mean) / std`.
    pub mean: f32,
    pub std: f32,
    /// Std of the gaussian noise augmenting training samples.
    pub noise_std: f32,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("data"),
            kind: "ModeB".into(),
            source: SourceKind::default(),
            batch_size: 32,
            shuffle: true,
            num_workers: 0,
            splitter: SplitterKind::default(),
            alpha: 0.5,
            num_shards: 10,
            train_samples: 1000,
            test_samples: 200,
            features: 8,
            mean: 0.0,
            std: 1.0,
            noise_std: 0.05,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FederateConfig {
    /// Requested number of clients, 0 means one per shard.
    pub client_num: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub task: String,
    pub model_num_per_trainer: usize,
    pub mirrored_models: bool,
    /// Output width: classes for classification, targets for regression.
    pub out_channels: usize,
}

impl ModelConfig {
    /// Returns `true` if `task` names a regression task, case-insensitively.
    pub fn is_regression(&self) -> bool {
        self.task.to_lowercase().contains("regression")
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            task: "classification".into(),
            model_num_per_trainer: 1,
            mirrored_models: false,
            out_channels: 2,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalConfig {
    pub count_flops: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainConfig {
    /// Epochs per train routine.
    pub local_update_steps: usize,
    pub lr: f32,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            local_update_steps: 1,
            lr: 0.01,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    /// Name of the registered trainer variant.
    #[serde(rename = "type")]
    pub kind: String,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            kind: "general".into(),
        }
    }
}

/// The run configuration. Every field has a default, so `{}` is a valid config.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data: DataConfig,
    pub federate: FederateConfig,
    pub model: ModelConfig,
    pub eval: EvalConfig,
    pub train: TrainConfig,
    pub trainer: TrainerConfig,
    pub device: Device,
    pub seed: u64,
}

impl Config {
    /// Parses and validates a JSON config.
    ///
    /// # Errors
    /// Returns `FedErr::Json` on malformed input and `FedErr::InvalidConfig` if validation fails.
    pub fn from_json(json: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(json)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reads, parses and validates a JSON config file.
    ///
    /// # Errors
    /// Returns `FedErr::Io` if the file cannot be read, otherwise as `from_json`.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|source| FedErr::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Checks the invariants that cannot be expressed by the field types.
    ///
    /// # Errors
    /// Returns `FedErr::InvalidConfig` naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| -> Result<()> { Err(FedErr::InvalidConfig(msg.into())) };

        if self.data.batch_size == 0 {
            return invalid("data.batch_size must be greater than 0");
        }
        if self.federate.client_num == 0 && self.data.num_shards == 0 {
            return invalid("data.num_shards must be greater than 0 when federate.client_num is 0");
        }
        if !(self.data.alpha > 0.0 && self.data.alpha.is_finite()) {
            return invalid("data.alpha must be positive and finite");
        }
        if !(self.data.std > 0.0 && self.data.std.is_finite()) {
            return invalid("data.std must be positive and finite");
        }
        if !(self.data.noise_std >= 0.0 && self.data.noise_std.is_finite()) {
            return invalid("data.noise_std must be non-negative and finite");
        }
        if self.data.features == 0 {
            return invalid("data.features must be greater than 0");
        }
        if self.model.out_channels == 0 {
            return invalid("model.out_channels must be greater than 0");
        }
        if self.model.model_num_per_trainer == 0 {
            return invalid("model.model_num_per_trainer must be greater than 0");
        }
        if !(self.train.lr > 0.0 && self.train.lr.is_finite()) {
            return invalid("train.lr must be positive and finite");
        }

        Ok(())
    }

    /// Returns a copy of this config with `federate.client_num` replaced.
    pub fn with_client_num(&self, client_num: usize) -> Self {
        let mut cfg = self.clone();
        cfg.federate.client_num = client_num;
        cfg
    }

    /// Returns how many shards the splitter should cut.
    pub fn num_shards(&self) -> Result<NonZeroUsize> {
        let requested = match self.federate.client_num {
            0 => self.data.num_shards,
            n => n,
        };

        NonZeroUsize::new(requested)
            .ok_or_else(|| FedErr::InvalidConfig("shard count must be greater than 0".into()))
    }

    /// Returns the batching parameters of the client loaders.
    pub fn loader_spec(&self) -> Result<LoaderSpec> {
        let batch_size = NonZeroUsize::new(self.data.batch_size)
            .ok_or_else(|| FedErr::InvalidConfig("data.batch_size must be greater than 0".into()))?;

        Ok(LoaderSpec {
            batch_size,
            shuffle: self.data.shuffle,
            num_workers: self.data.num_workers,
            seed: self.seed,
        })
    }
}
