mod dataloader;
mod dataset;
mod error;
mod modes;
mod registry;
mod shard;
mod source;
mod splitter;
mod transform;

pub use dataloader::{Batches, DataLoader};
pub use dataset::InMemoryDataset;
pub use error::{DataErr, Result};
pub use modes::{ModeShards, SplitMode, TransformPolicy};
pub use registry::{
    build_client_data, resolve_client_count, ClientBundle, ClientData, LoaderSpec, SplitShards,
};
pub use shard::{shard_range, Shard};
pub use source::{
    CsvSource, DataSplits, DatasetSource, SyntheticClassification, SyntheticGraph,
    SyntheticRegression, SyntheticShape,
};
pub use splitter::{IidSplitter, LdaSplitter, Splitter};
pub use transform::{Compose, GaussianNoise, Identity, Normalize, Transform};
