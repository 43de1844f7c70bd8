//! Configuration for the chattune CLI.

pub mod cli_config;

pub use cli_config::{CliConfig, CliConfigError, CliConfigResult, RUNTIME_ENV};
