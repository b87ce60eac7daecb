use std::{
    collections::{BTreeMap, btree_map},
    num::NonZeroUsize,
    sync::Arc,
};

use log::{debug, info};
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::{DataErr, DataLoader, Result, Shard, Transform};

/// Batching parameters shared by every client loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoaderSpec {
    pub batch_size: NonZeroUsize,
    pub shuffle: bool,
    pub num_workers: usize,
    pub seed: u64,
}

/// The shards of one split together with the transform its loaders apply.
#[derive(Debug, Clone)]
pub struct SplitShards {
    pub shards: Vec<Shard>,
    pub transform: Arc<dyn Transform>,
}

impl SplitShards {
    pub fn new(shards: Vec<Shard>, transform: Arc<dyn Transform>) -> Self {
        Self { shards, transform }
    }
}

/// The three loaders of one simulated client.
#[derive(Debug, Clone)]
pub struct ClientBundle {
    pub client_id: usize,
    pub train: DataLoader,
    pub val: DataLoader,
    pub test: DataLoader,
}

/// Every client's bundle, keyed and iterated by ascending client id.
#[derive(Debug, Clone, Default)]
pub struct ClientData {
    bundles: BTreeMap<usize, ClientBundle>,
}

impl ClientData {
    /// Returns the number of clients.
    #[inline]
    pub fn client_num(&self) -> usize {
        self.bundles.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }

    pub fn get(&self, client_id: usize) -> Option<&ClientBundle> {
        self.bundles.get(&client_id)
    }

    pub fn iter(&self) -> btree_map::Values<'_, usize, ClientBundle> {
        self.bundles.values()
    }

    pub fn into_bundles(self) -> impl Iterator<Item = ClientBundle> {
        self.bundles.into_values()
    }
}

impl<'a> IntoIterator for &'a ClientData {
    type Item = &'a ClientBundle;
    type IntoIter = btree_map::Values<'a, usize, ClientBundle>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Returns how many clients get a bundle given `shards` train shards.
///
/// A positive `requested` caps the count, zero means one client per shard.
pub fn resolve_client_count(shards: usize, requested: usize) -> usize {
    if requested > 0 {
        shards.min(requested)
    } else {
        shards
    }
}

fn worker_pool(num_workers: usize) -> Result<Option<Arc<ThreadPool>>> {
    if num_workers == 0 {
        return Ok(None);
    }

    let pool = ThreadPoolBuilder::new()
        .num_threads(num_workers)
        .thread_name(|i| format!("loader-{i}"))
        .build()?;
    Ok(Some(Arc::new(pool)))
}

/// Builds one bundle per client from per-split shard lists.
///
/// Client `c` (1-based) gets shard `c - 1` of every split. Only the train loader shuffles; all
/// loaders share one worker pool when `spec.num_workers > 0`.
///
/// # Errors
/// - `DataErr::NoShards` if `train` holds no shards.
/// - `DataErr::MissingShard` if `val` or `test` has fewer shards than the resolved count.
/// - `DataErr::WorkerPool` if the loader workers cannot be started.
pub fn build_client_data(
    train: SplitShards,
    val: SplitShards,
    test: SplitShards,
    spec: &LoaderSpec,
    requested: usize,
) -> Result<ClientData> {
    if train.shards.is_empty() {
        return Err(DataErr::NoShards);
    }

    let client_num = resolve_client_count(train.shards.len(), requested);
    let workers = worker_pool(spec.num_workers)?;

    let loader = |split: &'static str, shards: &SplitShards, client_id: usize, shuffle: bool| {
        let shard = shards
            .shards
            .get(client_id - 1)
            .cloned()
            .ok_or(DataErr::MissingShard { split, client_id })?;

        let dl = DataLoader::new(
            shard,
            spec.batch_size,
            shuffle,
            spec.seed.wrapping_add(client_id as u64),
            shards.transform.clone(),
        );
        Ok::<_, DataErr>(dl.with_workers(workers.clone()))
    };

    let mut bundles = BTreeMap::new();
    for client_id in 1..=client_num {
        let bundle = ClientBundle {
            client_id,
            train: loader("train", &train, client_id, spec.shuffle)?,
            val: loader("val", &val, client_id, false)?,
            test: loader("test", &test, client_id, false)?,
        };

        debug!(
            client_id = client_id,
            train = bundle.train.num_samples(),
            val = bundle.val.num_samples(),
            test = bundle.test.num_samples();
            "client bundle ready"
        );
        bundles.insert(client_id, bundle);
    }

    info!(
        requested = requested,
        shards = train.shards.len(),
        clients = client_num,
        workers = spec.num_workers;
        "client data built"
    );

    Ok(ClientData { bundles })
}

#[cfg(test)]
mod tests {
    use ml_core::Dataset;

    use super::*;
    use crate::{Identity, InMemoryDataset};

    fn shards(n: usize, per_shard: usize) -> SplitShards {
        let len = n * per_shard;
        let xs = (0..len).map(|i| vec![i as f32]).collect();
        let ys = (0..len).map(|_| 0.0).collect();
        let ds: Arc<dyn Dataset> = Arc::new(InMemoryDataset::from_dense(xs, ys).unwrap());

        let shards = (0..n)
            .map(|i| Shard::new(ds.clone(), (i * per_shard..(i + 1) * per_shard).collect()))
            .collect();
        SplitShards::new(shards, Arc::new(Identity))
    }

    fn spec(shuffle: bool) -> LoaderSpec {
        LoaderSpec {
            batch_size: NonZeroUsize::new(4).unwrap(),
            shuffle,
            num_workers: 0,
            seed: 1,
        }
    }

    #[test]
    fn resolved_count_is_capped_and_zero_means_all() {
        assert_eq!(resolve_client_count(7, 0), 7);
        assert_eq!(resolve_client_count(7, 3), 3);
        assert_eq!(resolve_client_count(7, 50), 7);
        assert_eq!(resolve_client_count(1, 1), 1);
    }

    #[test]
    fn bundles_are_keyed_from_one_in_ascending_order() {
        let data = build_client_data(shards(5, 3), shards(5, 2), shards(5, 2), &spec(true), 0)
            .unwrap();

        assert_eq!(data.client_num(), 5);
        let ids: Vec<usize> = data.iter().map(|b| b.client_id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);

        let b = data.get(2).unwrap();
        assert_eq!(b.train.shard().indices(), &[3, 4, 5]);
        assert!(b.train.shuffles());
        assert!(!b.val.shuffles() && !b.test.shuffles());
    }

    #[test]
    fn requested_count_limits_bundles() {
        let data = build_client_data(shards(5, 3), shards(5, 2), shards(5, 2), &spec(false), 2)
            .unwrap();
        assert_eq!(data.client_num(), 2);
        assert!(data.get(3).is_none());
    }

    #[test]
    fn short_val_split_is_an_error() {
        let err = build_client_data(shards(4, 3), shards(2, 2), shards(4, 2), &spec(false), 0)
            .unwrap_err();
        assert!(matches!(
            err,
            DataErr::MissingShard {
                split: "val",
                client_id: 3
            }
        ));
    }

    #[test]
    fn empty_train_split_is_an_error() {
        let empty = SplitShards::new(Vec::new(), Arc::new(Identity));
        let err = build_client_data(empty, shards(1, 1), shards(1, 1), &spec(false), 0);
        assert!(matches!(err, Err(DataErr::NoShards)));
    }
}
