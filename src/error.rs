use std::{fmt, io, path::PathBuf};

use client_data::DataErr;
use ml_core::MlError;

/// The simulator's result type.
pub type Result<T> = std::result::Result<T, FedErr>;

/// All errors that can stop a simulation run.
#[derive(Debug)]
pub enum FedErr {
    /// A registry lookup found nothing under `name`.
    NoMatchingHandler { kind: &'static str, name: String },
    /// A context variable was read outside of its lifecycle.
    MissingVar(&'static str),
    /// Invalid configuration, caught before any data is loaded.
    InvalidConfig(String),
    Data(DataErr),
    Ml(MlError),
    Io { path: PathBuf, source: io::Error },
    Json(serde_json::Error),
}

impl fmt::Display for FedErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoMatchingHandler { kind, name } => {
                write!(f, "no {kind} registered under '{name}'")
            }
            Self::MissingVar(key) => write!(f, "context variable '{key}' is not set"),
            Self::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            Self::Data(e) => write!(f, "data error: {e}"),
            Self::Ml(e) => write!(f, "ml error: {e}"),
            Self::Io { path, source } => write!(f, "cannot read '{}': {source}", path.display()),
            Self::Json(e) => write!(f, "malformed config: {e}"),
        }
    }
}

impl std::error::Error for FedErr {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Data(e) => Some(e),
            Self::Ml(e) => Some(e),
            Self::Io { source, .. } => Some(source),
            Self::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<DataErr> for FedErr {
    fn from(e: DataErr) -> Self {
        Self::Data(e)
    }
}

impl From<MlError> for FedErr {
    fn from(e: MlError) -> Self {
        Self::Ml(e)
    }
}

impl From<serde_json::Error> for FedErr {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}
