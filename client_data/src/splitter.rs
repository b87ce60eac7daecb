use std::{collections::BTreeMap, num::NonZeroUsize, sync::Arc};

use log::debug;
use ml_core::{DataError, Dataset};
use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};
use rand_distr::{Distribution, Gamma};

use crate::{DataErr, Result, Shard, dataloader::mix_seed, shard::shard_range};

/// Partitions a dataset into per-client shards.
///
/// Implementations must be deterministic for a fixed configuration and stream, must not produce
/// more shards than requested nor more than the dataset has samples, and must leave the source
/// dataset untouched.
pub trait Splitter: Send + Sync {
    /// Splits `dataset` into at most `num_shards` shards, drawing from stream 0.
    ///
    /// # Errors
    /// Returns `DataErr::EmptyDataset` if `dataset` holds no samples.
    fn split(&self, dataset: Arc<dyn Dataset>, num_shards: NonZeroUsize) -> Result<Vec<Shard>> {
        self.split_stream(dataset, num_shards, 0)
    }

    /// Same as `split`, drawing the randomness from `stream`. Distinct streams give independent
    /// partitions of the same dataset.
    ///
    /// # Errors
    /// Returns `DataErr::EmptyDataset` if `dataset` holds no samples.
    fn split_stream(
        &self,
        dataset: Arc<dyn Dataset>,
        num_shards: NonZeroUsize,
        stream: u64,
    ) -> Result<Vec<Shard>>;
}

/// Stream 0 keeps the configured seed.
fn stream_seed(seed: u64, stream: u64) -> u64 {
    match stream {
        0 => seed,
        s => mix_seed(seed, s, 0),
    }
}

fn shard_count(dataset: &dyn Dataset, num_shards: NonZeroUsize) -> Result<usize> {
    match dataset.len() {
        0 => Err(DataErr::EmptyDataset),
        len => Ok(num_shards.get().min(len)),
    }
}

/// Independent and identically distributed split: optionally permute, then cut contiguous,
/// balanced ranges.
///
/// Leftover samples are distributed, the first `len % n` shards get one extra.
#[derive(Debug, Clone, Copy)]
pub struct IidSplitter {
    seed: u64,
    shuffle: bool,
}

impl IidSplitter {
    pub fn new(seed: u64, shuffle: bool) -> Self {
        Self { seed, shuffle }
    }
}

impl Splitter for IidSplitter {
    fn split_stream(
        &self,
        dataset: Arc<dyn Dataset>,
        num_shards: NonZeroUsize,
        stream: u64,
    ) -> Result<Vec<Shard>> {
        let n = shard_count(dataset.as_ref(), num_shards)?;
        let len = dataset.len();

        let mut indices: Vec<usize> = (0..len).collect();
        if self.shuffle {
            indices.shuffle(&mut StdRng::seed_from_u64(stream_seed(self.seed, stream)));
        }

        debug!(samples = len, shards = n, stream = stream; "iid split");

        Ok((0..n)
            .map(|i| Shard::new(dataset.clone(), indices[shard_range(len, i, n)].to_vec()))
            .collect())
    }
}

/// Label-skewed split: for every class, the share each shard receives is drawn from a
/// symmetric Dirichlet(`alpha`). Smaller `alpha` means more skew.
///
/// Shards left empty by the draw take one sample from the largest shard.
#[derive(Debug, Clone, Copy)]
pub struct LdaSplitter {
    alpha: f64,
    seed: u64,
}

impl LdaSplitter {
    /// Creates a new `LdaSplitter`.
    ///
    /// # Errors
    /// Returns `DataErr::InvalidConfig` if `alpha` is not strictly positive.
    pub fn new(alpha: f64, seed: u64) -> Result<Self> {
        if !(alpha > 0.0 && alpha.is_finite()) {
            return Err(DataErr::InvalidConfig(format!(
                "lda alpha must be positive and finite, got {alpha}"
            )));
        }

        Ok(Self { alpha, seed })
    }

    fn group_by_class(dataset: &dyn Dataset) -> Result<BTreeMap<usize, Vec<usize>>> {
        let mut by_class: BTreeMap<usize, Vec<usize>> = BTreeMap::new();

        for index in 0..dataset.len() {
            let class = dataset.get(index)?.class().ok_or(DataError::InvalidSample(
                "label-skewed splitting needs single class targets",
            ))?;
            by_class.entry(class).or_default().push(index);
        }

        Ok(by_class)
    }
}

impl Splitter for LdaSplitter {
    fn split_stream(
        &self,
        dataset: Arc<dyn Dataset>,
        num_shards: NonZeroUsize,
        stream: u64,
    ) -> Result<Vec<Shard>> {
        let n = shard_count(dataset.as_ref(), num_shards)?;
        let by_class = Self::group_by_class(dataset.as_ref())?;

        let gamma = Gamma::new(self.alpha, 1.0)
            .map_err(|e| DataErr::InvalidConfig(format!("lda alpha {}: {e}", self.alpha)))?;
        let mut rng = StdRng::seed_from_u64(stream_seed(self.seed, stream));
        let mut parts = vec![Vec::new(); n];

        for mut members in by_class.into_values() {
            members.shuffle(&mut rng);

            let mut weights: Vec<f64> = (0..n).map(|_| gamma.sample(&mut rng)).collect();
            let total: f64 = weights.iter().sum();
            if !(total > 0.0) {
                weights = vec![1.0; n];
            }
            let total: f64 = weights.iter().sum();

            let mut start = 0;
            let mut acc = 0.0;
            for (shard, w) in weights.iter().enumerate() {
                acc += w;
                let end = if shard + 1 == n {
                    members.len()
                } else {
                    ((acc / total) * members.len() as f64).round() as usize
                };
                let end = end.clamp(start, members.len());

                parts[shard].extend_from_slice(&members[start..end]);
                start = end;
            }
        }

        for shard in 0..n {
            if !parts[shard].is_empty() {
                continue;
            }

            let donor = (0..n).max_by_key(|&s| parts[s].len());
            if let Some(moved) = donor.and_then(|d| parts[d].pop()) {
                parts[shard].push(moved);
            }
        }

        debug!(
            samples = dataset.len(),
            shards = n,
            alpha = self.alpha,
            stream = stream;
            "lda split"
        );

        Ok(parts
            .into_iter()
            .map(|mut indices| {
                indices.sort_unstable();
                Shard::new(dataset.clone(), indices)
            })
            .collect())
    }
}
