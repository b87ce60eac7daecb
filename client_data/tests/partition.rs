use std::{num::NonZeroUsize, sync::Arc};

use client_data::{
    build_client_data, Identity, IidSplitter, InMemoryDataset, LdaSplitter, LoaderSpec, Normalize,
    SplitMode, Splitter, TransformPolicy,
};
use ml_core::Dataset;

fn dataset(len: usize) -> Arc<dyn Dataset> {
    let xs = (0..len).map(|i| vec![i as f32, -(i as f32)]).collect();
    let ys = (0..len).map(|i| (i % 3) as f32).collect();
    Arc::new(InMemoryDataset::from_dense(xs, ys).unwrap())
}

fn loader_spec(batch_size: usize, num_workers: usize) -> LoaderSpec {
    LoaderSpec {
        batch_size: NonZeroUsize::new(batch_size).unwrap(),
        shuffle: true,
        num_workers,
        seed: 42,
    }
}

fn policy() -> TransformPolicy {
    TransformPolicy {
        augment: Arc::new(Identity),
        deterministic: Arc::new(Normalize::new(0.0, 1.0).unwrap()),
    }
}

#[test]
fn hundred_samples_ten_clients_batch_four() {
    let splitter = IidSplitter::new(0, true);
    let shards = SplitMode::LinearProbe
        .assemble(dataset(100), dataset(100), &splitter, NonZeroUsize::new(10).unwrap(), &policy())
        .unwrap();

    let data = build_client_data(shards.train, shards.val, shards.test, &loader_spec(4, 0), 10)
        .unwrap();

    assert_eq!(data.client_num(), 10);
    for bundle in &data {
        for loader in [&bundle.train, &bundle.val, &bundle.test] {
            assert_eq!(loader.num_samples(), 10);
            assert_eq!(loader.len(), 3);

            let sizes: Vec<usize> = loader.iter(0).map(|b| b.unwrap().len()).collect();
            assert_eq!(sizes, vec![4, 4, 2]);
        }
    }
}

#[test]
fn zero_requested_clients_takes_every_shard() {
    let splitter = IidSplitter::new(1, false);
    let shards = SplitMode::Contrastive
        .assemble(dataset(21), dataset(14), &splitter, NonZeroUsize::new(7).unwrap(), &policy())
        .unwrap();

    let data = build_client_data(shards.train, shards.val, shards.test, &loader_spec(2, 0), 0)
        .unwrap();

    assert_eq!(data.client_num(), 7);
    assert!((1..=7).all(|c| data.get(c).is_some()));
}

#[test]
fn contrastive_val_matches_train_per_client() {
    let splitter = IidSplitter::new(9, true);
    let shards = SplitMode::Contrastive
        .assemble(dataset(40), dataset(40), &splitter, NonZeroUsize::new(4).unwrap(), &policy())
        .unwrap();
    let data = build_client_data(shards.train, shards.val, shards.test, &loader_spec(3, 0), 4)
        .unwrap();

    for bundle in &data {
        assert!(bundle.train.shard().same_samples(bundle.val.shard()));
    }
}

#[test]
fn linear_probe_val_is_partitioned_apart_from_train() {
    let splitters: [Box<dyn Splitter>; 2] = [
        Box::new(IidSplitter::new(9, true)),
        Box::new(LdaSplitter::new(0.5, 9).unwrap()),
    ];

    let clients = NonZeroUsize::new(4).unwrap();
    for splitter in &splitters {
        let shards = SplitMode::LinearProbe
            .assemble(dataset(40), dataset(20), splitter.as_ref(), clients, &policy())
            .unwrap();
        let data = build_client_data(shards.train, shards.val, shards.test, &loader_spec(3, 0), 4)
            .unwrap();

        assert!(data.iter().any(|b| !b.train.shard().same_samples(b.val.shard())));

        let val_samples: usize = data.iter().map(|b| b.val.num_samples()).sum();
        assert_eq!(val_samples, 40);
    }
}

#[test]
fn worker_pool_does_not_change_batches() {
    let build = |num_workers| {
        let splitter = IidSplitter::new(5, true);
        let shards = SplitMode::LinearProbe
            .assemble(dataset(60), dataset(30), &splitter, NonZeroUsize::new(3).unwrap(), &policy())
            .unwrap();
        build_client_data(shards.train, shards.val, shards.test, &loader_spec(7, num_workers), 0)
            .unwrap()
    };

    let sequential = build(0);
    let parallel = build(4);

    for (a, b) in sequential.iter().zip(parallel.iter()) {
        for epoch in 0..2 {
            let a: Vec<_> = a.train.iter(epoch).map(|b| b.unwrap()).collect();
            let b: Vec<_> = b.train.iter(epoch).map(|b| b.unwrap()).collect();
            assert_eq!(a, b);
        }
    }
}

#[test]
fn splitters_never_touch_the_source() {
    let ds = dataset(10);
    let before: Vec<_> = (0..ds.len()).map(|i| ds.get(i).unwrap()).collect();

    IidSplitter::new(3, true)
        .split(ds.clone(), NonZeroUsize::new(3).unwrap())
        .unwrap();

    let after: Vec<_> = (0..ds.len()).map(|i| ds.get(i).unwrap()).collect();
    assert_eq!(before, after);
}
