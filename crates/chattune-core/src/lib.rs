//! chattune Core
//!
//! Concrete backends behind the `chattune-training` capability traits:
//! - `hub`: dataset splits downloaded from the Hugging Face Hub
//! - `training`: the external runtime worker that owns the ML framework
//! - `config`: CLI configuration files

pub mod config;
pub mod hub;
pub mod training;

pub use config::{CliConfig, CliConfigError, CliConfigResult};
pub use hub::HubDatasetLoader;
pub use training::{RuntimeBackend, RuntimeCommand};
