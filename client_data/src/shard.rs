use std::{fmt, ops::Range, sync::Arc};

use ml_core::{DataError, Dataset, Sample};

/// Returns the positions of an ordered index list that shard `shard` receives when `len`
/// positions are dealt to `num_shards` clients.
///
/// Leftover positions are distributed: the first `len % num_shards` shards get one more than
/// the others.
///
/// # Panics
/// If `shard >= num_shards`.
pub fn shard_range(len: usize, shard: usize, num_shards: usize) -> Range<usize> {
    assert!(shard < num_shards, "shard {shard} out of {num_shards}");

    let (base, leftover) = (len / num_shards, len % num_shards);
    let start = shard * base + shard.min(leftover);
    start..start + base + usize::from(shard < leftover)
}

/// A dataset restricted to the subset of indices assigned to one client.
///
/// Cloning a shard is cheap: the source dataset and the index list are shared.
#[derive(Clone)]
pub struct Shard {
    dataset: Arc<dyn Dataset>,
    indices: Arc<[usize]>,
}

impl Shard {
    pub fn new(dataset: Arc<dyn Dataset>, indices: Vec<usize>) -> Self {
        Self {
            dataset,
            indices: indices.into(),
        }
    }

    /// Returns the indices into the source dataset, in shard order.
    #[inline]
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// Returns `true` if both shards view the same source samples in the same order.
    pub fn same_samples(&self, other: &Shard) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.dataset), Arc::as_ptr(&other.dataset))
            && self.indices == other.indices
    }

    /// Returns `true` if both shards share a single index list, i.e. one is a clone of the other.
    pub fn is_clone_of(&self, other: &Shard) -> bool {
        Arc::ptr_eq(&self.indices, &other.indices)
    }
}

impl Dataset for Shard {
    #[inline]
    fn len(&self) -> usize {
        self.indices.len()
    }

    fn get(&self, index: usize) -> Result<Sample, DataError> {
        let &source = self.indices.get(index).ok_or(DataError::OutOfBounds {
            index,
            len: self.indices.len(),
        })?;

        self.dataset.get(source)
    }
}

impl fmt::Debug for Shard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shard")
            .field("len", &self.indices.len())
            .field("source_len", &self.dataset.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryDataset;

    fn source() -> Arc<dyn Dataset> {
        let xs = (0..10).map(|i| vec![i as f32]).collect();
        let ys = (0..10).map(|i| i as f32 + 100.0).collect();
        Arc::new(InMemoryDataset::from_dense(xs, ys).unwrap())
    }

    #[test]
    fn leftover_positions_go_to_the_first_clients() {
        let ranges: Vec<_> = (0..4).map(|c| shard_range(14, c, 4)).collect();
        assert_eq!(ranges, vec![0..4, 4..8, 8..11, 11..14]);

        assert_eq!(shard_range(2, 2, 3), 2..2);
    }

    #[test]
    fn shard_maps_positions_to_source_samples() {
        let shard = Shard::new(source(), vec![7, 2]);
        assert_eq!(shard.len(), 2);
        assert_eq!(shard.get(0).unwrap(), Sample::dense(vec![7.0], 107.0));
        assert_eq!(shard.get(1).unwrap(), Sample::dense(vec![2.0], 102.0));
        assert!(shard.get(2).is_err());
    }

    #[test]
    fn clones_share_samples_but_rebuilt_shards_do_not_share_indices() {
        let ds = source();
        let a = Shard::new(ds.clone(), vec![1, 2, 3]);
        let b = a.clone();
        let c = Shard::new(ds, vec![1, 2, 3]);

        assert!(a.same_samples(&b) && a.is_clone_of(&b));
        assert!(a.same_samples(&c) && !a.is_clone_of(&c));
    }
}
