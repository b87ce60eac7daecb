use std::{error::Error, fmt, io, path::PathBuf};

use ml_core::{DataError, MlError};

/// The client data module's result type.
pub type Result<T> = std::result::Result<T, DataErr>;

/// Failures while loading, splitting or batching client data.
#[derive(Debug)]
pub enum DataErr {
    Ml(MlError),
    Data(DataError),
    EmptyDataset,
    NoShards,
    MissingShard {
        split: &'static str,
        client_id: usize,
    },
    InvalidConfig(String),
    Io {
        path: PathBuf,
        source: io::Error,
    },
    Parse {
        path: PathBuf,
        line: usize,
        msg: String,
    },
    WorkerPool(rayon::ThreadPoolBuildError),
}

impl fmt::Display for DataErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataErr::Ml(e) => write!(f, "{e}"),
            DataErr::Data(e) => write!(f, "{e}"),
            DataErr::EmptyDataset => write!(f, "cannot split an empty dataset"),
            DataErr::NoShards => write!(f, "the train split produced no shards"),
            DataErr::MissingShard { split, client_id } => {
                write!(f, "no {split} shard for client {client_id}")
            }
            DataErr::InvalidConfig(msg) => write!(f, "invalid data config: {msg}"),
            DataErr::Io { path, source } => write!(f, "cannot read '{}': {source}", path.display()),
            DataErr::Parse { path, line, msg } => {
                write!(f, "{} line {line}: {msg}", path.display())
            }
            DataErr::WorkerPool(e) => write!(f, "cannot start loader workers: {e}"),
        }
    }
}

impl Error for DataErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            DataErr::Ml(e) => Some(e),
            DataErr::Data(e) => Some(e),
            DataErr::Io { source, .. } => Some(source),
            DataErr::WorkerPool(e) => Some(e),
            _ => None,
        }
    }
}

impl From<MlError> for DataErr {
    fn from(value: MlError) -> Self {
        Self::Ml(value)
    }
}

impl From<DataError> for DataErr {
    fn from(value: DataError) -> Self {
        Self::Data(value)
    }
}

impl From<rayon::ThreadPoolBuildError> for DataErr {
    fn from(value: rayon::ThreadPoolBuildError) -> Self {
        Self::WorkerPool(value)
    }
}
