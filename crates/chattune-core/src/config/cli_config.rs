//! CLI configuration file support.
//!
//! Settings that are not part of a run's identity: where outputs go, which
//! runtime worker to launch, the default log level. Run identity always comes
//! from the environment (see `chattune_training::RunConfig`).

use crate::training::RuntimeCommand;
use chattune_training::QuantizationMethod;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable holding the runtime worker command line.
pub const RUNTIME_ENV: &str = "CHATTUNE_RUNTIME";

/// CLI configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CliConfig {
    /// Log level
    #[serde(default)]
    pub log_level: Option<String>,

    /// Root for per-job outputs (defaults to `./outputs`)
    #[serde(default)]
    pub output_dir: Option<PathBuf>,

    /// Parent directory of the exported model directories (defaults to `.`)
    #[serde(default)]
    pub export_dir: Option<PathBuf>,

    /// GGUF quantization for the second export
    #[serde(default)]
    pub quantization: Option<QuantizationMethod>,

    /// Runtime worker program
    #[serde(default)]
    pub runtime: Option<RuntimeCommand>,
}

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum CliConfigError {
    /// Configuration file not found.
    #[error("Configuration file not found: {0}")]
    NotFound(String),

    /// Failed to read configuration file.
    #[error("Failed to read configuration file: {0}")]
    ReadError(String),

    /// Failed to parse configuration file.
    #[error("Failed to parse configuration file: {0}")]
    ParseError(String),

    /// Invalid configuration value.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Result type for configuration operations.
pub type CliConfigResult<T> = std::result::Result<T, CliConfigError>;

impl CliConfig {
    /// Load configuration from a TOML file.
    pub fn load_from_file(path: &Path) -> CliConfigResult<Self> {
        if !path.exists() {
            return Err(CliConfigError::NotFound(path.display().to_string()));
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| CliConfigError::ReadError(format!("{}: {}", path.display(), e)))?;

        let config: Self =
            toml::from_str(&content).map_err(|e| CliConfigError::ParseError(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Get default global configuration file path.
    pub fn default_global_path() -> PathBuf {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(".chattune")
            .join("config.toml")
    }

    /// Get default local configuration file path.
    pub fn default_local_path() -> PathBuf {
        PathBuf::from(".chattunerc")
    }

    /// Discover and load configuration files.
    ///
    /// Loads configuration from:
    /// 1. Global config (~/.chattune/config.toml)
    /// 2. Local config (./.chattunerc)
    ///
    /// Local config overrides global config. Missing files are skipped, broken
    /// ones are reported.
    pub fn discover_and_load() -> CliConfigResult<Self> {
        let mut config = Self::default();
        for path in [Self::default_global_path(), Self::default_local_path()] {
            match Self::load_from_file(&path) {
                Ok(found) => config.merge(&found),
                Err(CliConfigError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(config)
    }

    /// Merge another configuration into this one.
    ///
    /// Values from `other` override values in `self` if they are Some.
    pub fn merge(&mut self, other: &Self) {
        if let Some(ref log_level) = other.log_level {
            self.log_level = Some(log_level.clone());
        }
        if let Some(ref output_dir) = other.output_dir {
            self.output_dir = Some(output_dir.clone());
        }
        if let Some(ref export_dir) = other.export_dir {
            self.export_dir = Some(export_dir.clone());
        }
        if let Some(quantization) = other.quantization {
            self.quantization = Some(quantization);
        }
        if let Some(ref runtime) = other.runtime {
            self.runtime = Some(runtime.clone());
        }
    }

    /// Overlay settings taken from the environment.
    ///
    /// `CHATTUNE_RUNTIME` replaces the configured runtime when it is set and not blank.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(runtime) = lookup(RUNTIME_ENV).as_deref().and_then(RuntimeCommand::parse) {
            self.runtime = Some(runtime);
        }
    }

    fn validate(&self) -> CliConfigResult<()> {
        if let Some(runtime) = &self.runtime {
            if runtime.program.trim().is_empty() {
                return Err(CliConfigError::InvalidValue("runtime.program must not be empty".to_string()));
            }
        }
        if let Some(level) = &self.log_level {
            if !matches!(level.as_str(), "trace" | "debug" | "info" | "warn" | "error") {
                return Err(CliConfigError::InvalidValue(format!("unknown log_level: {level}")));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");

        let config_content = r#"
log_level = "debug"
output_dir = "/data/outputs"
export_dir = "/data/exports"
quantization = "q8_0"

[runtime]
program = "python"
args = ["worker.py"]
"#;

        std::fs::write(&config_path, config_content).unwrap();

        let config = CliConfig::load_from_file(&config_path).unwrap();
        assert_eq!(config.log_level, Some("debug".to_string()));
        assert_eq!(config.output_dir, Some(PathBuf::from("/data/outputs")));
        assert_eq!(config.export_dir, Some(PathBuf::from("/data/exports")));
        assert_eq!(config.quantization, Some(QuantizationMethod::Q8_0));
        assert_eq!(config.runtime, Some(RuntimeCommand::new("python").with_args(["worker.py"])));
    }

    #[test]
    fn test_load_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let err = CliConfig::load_from_file(&temp_dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(err, CliConfigError::NotFound(_)));
    }

    #[test]
    fn test_load_rejects_bad_values() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");

        std::fs::write(&config_path, "log_level = \"loud\"\n").unwrap();
        assert!(matches!(CliConfig::load_from_file(&config_path), Err(CliConfigError::InvalidValue(_))));

        std::fs::write(&config_path, "[runtime]\nprogram = \" \"\n").unwrap();
        assert!(matches!(CliConfig::load_from_file(&config_path), Err(CliConfigError::InvalidValue(_))));

        std::fs::write(&config_path, "output_dir = [").unwrap();
        assert!(matches!(CliConfig::load_from_file(&config_path), Err(CliConfigError::ParseError(_))));
    }

    #[test]
    fn test_merge() {
        let mut global = CliConfig {
            log_level: Some("info".to_string()),
            output_dir: Some(PathBuf::from("/global/outputs")),
            runtime: Some(RuntimeCommand::new("python")),
            ..Default::default()
        };

        let local = CliConfig {
            output_dir: Some(PathBuf::from("local-outputs")),
            quantization: Some(QuantizationMethod::F16),
            ..Default::default()
        };

        global.merge(&local);
        assert_eq!(global.log_level, Some("info".to_string()));
        assert_eq!(global.output_dir, Some(PathBuf::from("local-outputs")));
        assert_eq!(global.quantization, Some(QuantizationMethod::F16));
        assert_eq!(global.runtime, Some(RuntimeCommand::new("python")));
    }

    #[test]
    fn test_env_override_replaces_runtime() {
        let mut config = CliConfig { runtime: Some(RuntimeCommand::new("python")), ..Default::default() };

        config.apply_env_overrides(|key| (key == RUNTIME_ENV).then(|| "uv run worker.py".to_string()));
        assert_eq!(config.runtime, Some(RuntimeCommand::new("uv").with_args(["run", "worker.py"])));

        config.apply_env_overrides(|_| Some("   ".to_string()));
        assert_eq!(config.runtime.unwrap().program, "uv");
    }
}
