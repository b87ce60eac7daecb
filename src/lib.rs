pub mod config;
pub mod context;
mod data;
mod error;
mod monitor;
mod register;
mod runner;
pub mod trainer;

pub use config::Config;
pub use context::{Context, Lifecycle, VarStore};
pub use data::{load_client_data, load_client_data_with};
pub use error::{FedErr, Result};
pub use monitor::{FlopEstimate, Monitor};
pub use register::{DataLoaderFn, DataRegistry, Registry, TrainerFn, TrainerRegistry};
pub use runner::{ClientReport, Runner};
