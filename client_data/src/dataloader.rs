use std::{fmt, num::NonZeroUsize, sync::Arc};

use ml_core::{Batch, Dataset, Sample};
use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};
use rayon::{ThreadPool, prelude::*};

use crate::{Result, Shard, Transform};

/// Derives an independent seed from a base seed and two stream coordinates (splitmix64).
pub(crate) fn mix_seed(seed: u64, a: u64, b: u64) -> u64 {
    let mut z = seed
        .wrapping_add(a.wrapping_mul(0x9E37_79B9_7F4A_7C15))
        .wrapping_add(b.wrapping_mul(0xD1B5_4A32_D192_ED03));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Shard-aware loader producing collated batches.
///
/// The batch sequence is lazy, finite and restartable: `iter(epoch)` can be called any number
/// of times. With `shuffle` the order is a permutation seeded by `(seed, epoch)`, so every epoch
/// is different but reproducible. With a worker pool, the samples of one batch are fetched and
/// transformed in parallel; sample order within the batch is unaffected.
#[derive(Clone)]
pub struct DataLoader {
    shard: Shard,
    batch_size: NonZeroUsize,
    shuffle: bool,
    seed: u64,
    transform: Arc<dyn Transform>,
    workers: Option<Arc<ThreadPool>>,
}

impl DataLoader {
    pub fn new(
        shard: Shard,
        batch_size: NonZeroUsize,
        shuffle: bool,
        seed: u64,
        transform: Arc<dyn Transform>,
    ) -> Self {
        Self {
            shard,
            batch_size,
            shuffle,
            seed,
            transform,
            workers: None,
        }
    }

    /// Fetches samples on `workers` instead of the calling thread.
    pub fn with_workers(mut self, workers: Option<Arc<ThreadPool>>) -> Self {
        self.workers = workers;
        self
    }

    #[inline]
    pub fn shard(&self) -> &Shard {
        &self.shard
    }

    #[inline]
    pub fn batch_size(&self) -> usize {
        self.batch_size.get()
    }

    #[inline]
    pub fn shuffles(&self) -> bool {
        self.shuffle
    }

    #[inline]
    pub fn transform(&self) -> &Arc<dyn Transform> {
        &self.transform
    }

    /// Returns the number of samples in the shard.
    #[inline]
    pub fn num_samples(&self) -> usize {
        self.shard.len()
    }

    /// Returns the number of batches one epoch yields, `ceil(samples / batch_size)`.
    #[inline]
    pub fn len(&self) -> usize {
        self.shard.len().div_ceil(self.batch_size.get())
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.shard.is_empty()
    }

    /// Returns the shard positions in the order `epoch` visits them.
    pub fn order(&self, epoch: u64) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.shard.len()).collect();
        if self.shuffle {
            order.shuffle(&mut StdRng::seed_from_u64(mix_seed(self.seed, epoch, 0)));
        }
        order
    }

    /// Returns the batches of `epoch`.
    pub fn iter(&self, epoch: u64) -> Batches<'_> {
        Batches {
            loader: self,
            order: self.order(epoch),
            epoch,
            cursor: 0,
        }
    }

    fn fetch(&self, epoch: u64, position: usize) -> Result<Sample> {
        let sample = self.shard.get(position)?;
        let mut rng = StdRng::seed_from_u64(mix_seed(self.seed, epoch, position as u64 + 1));
        Ok(self.transform.apply(sample, &mut rng))
    }

    fn fetch_all(&self, epoch: u64, positions: &[usize]) -> Result<Vec<Sample>> {
        match &self.workers {
            Some(pool) => pool.install(|| {
                positions
                    .par_iter()
                    .map(|&p| self.fetch(epoch, p))
                    .collect::<Result<Vec<_>>>()
            }),
            None => positions.iter().map(|&p| self.fetch(epoch, p)).collect(),
        }
    }
}

impl fmt::Debug for DataLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataLoader")
            .field("shard", &self.shard)
            .field("batch_size", &self.batch_size)
            .field("shuffle", &self.shuffle)
            .field("transform", &self.transform)
            .field("workers", &self.workers.as_ref().map(|p| p.current_num_threads()))
            .finish()
    }
}

/// The batches of one epoch.
pub struct Batches<'a> {
    loader: &'a DataLoader,
    order: Vec<usize>,
    epoch: u64,
    cursor: usize,
}

impl Iterator for Batches<'_> {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor >= self.order.len() {
            return None;
        }

        let end = (self.cursor + self.loader.batch_size()).min(self.order.len());
        let positions = &self.order[self.cursor..end];
        self.cursor = end;

        let batch = self
            .loader
            .fetch_all(self.epoch, positions)
            .and_then(|samples| Ok(Batch::collate(&samples)?));
        Some(batch)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = (self.order.len() - self.cursor).div_ceil(self.loader.batch_size());
        (left, Some(left))
    }
}

impl ExactSizeIterator for Batches<'_> {}

#[cfg(test)]
mod tests {
    use rayon::ThreadPoolBuilder;

    use super::*;
    use crate::{GaussianNoise, Identity, InMemoryDataset};

    fn shard(len: usize) -> Shard {
        let xs = (0..len).map(|i| vec![i as f32]).collect();
        let ys = (0..len).map(|i| i as f32 + 100.0).collect();
        let ds: Arc<dyn Dataset> = Arc::new(InMemoryDataset::from_dense(xs, ys).unwrap());
        Shard::new(ds, (0..len).collect())
    }

    fn batch_size(v: usize) -> NonZeroUsize {
        NonZeroUsize::new(v).unwrap()
    }

    fn first_features(batch: &Batch) -> Vec<f32> {
        let Batch::Dense { x, .. } = batch else {
            panic!("expected a dense batch");
        };
        x.column(0).to_vec()
    }

    #[test]
    fn batches_respect_batch_size_and_restart() {
        let dl = DataLoader::new(shard(10), batch_size(4), false, 0, Arc::new(Identity));
        assert_eq!(dl.len(), 3);

        let sizes: Vec<usize> = dl.iter(0).map(|b| b.unwrap().len()).collect();
        assert_eq!(sizes, vec![4, 4, 2]);

        let first = dl.iter(0).next().unwrap().unwrap();
        assert_eq!(first_features(&first), vec![0.0, 1.0, 2.0, 3.0]);

        let again = dl.iter(0).next().unwrap().unwrap();
        assert_eq!(first, again);
    }

    #[test]
    fn shuffle_changes_between_epochs_but_is_reproducible() {
        let dl = DataLoader::new(shard(32), batch_size(32), true, 5, Arc::new(Identity));

        let e0 = first_features(&dl.iter(0).next().unwrap().unwrap());
        let e0_again = first_features(&dl.iter(0).next().unwrap().unwrap());
        let e1 = first_features(&dl.iter(1).next().unwrap().unwrap());

        assert_eq!(e0, e0_again);
        assert_ne!(e0, e1);

        let mut sorted = e1.clone();
        sorted.sort_by(f32::total_cmp);
        assert_eq!(sorted, (0..32).map(|i| i as f32).collect::<Vec<_>>());
    }

    #[test]
    fn workers_do_not_change_batch_contents() {
        let noise: Arc<dyn Transform> = Arc::new(GaussianNoise::new(1.0).unwrap());
        let sequential = DataLoader::new(shard(17), batch_size(5), true, 3, noise.clone());
        let pool = Arc::new(ThreadPoolBuilder::new().num_threads(3).build().unwrap());
        let parallel = sequential.clone().with_workers(Some(pool));

        let a: Vec<Batch> = sequential.iter(2).map(|b| b.unwrap()).collect();
        let b: Vec<Batch> = parallel.iter(2).map(|b| b.unwrap()).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn size_hint_counts_remaining_batches() {
        let dl = DataLoader::new(shard(9), batch_size(2), false, 0, Arc::new(Identity));
        let mut it = dl.iter(0);
        assert_eq!(it.len(), 5);
        it.next();
        assert_eq!(it.len(), 4);
    }
}
