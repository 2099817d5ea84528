//! Configuration Loader
//!
//! Environment-aware configuration loading. Discovers `stepper-config.*` files
//! in a directory, merges the environment specific overlay and applies
//! `STEPPER__SECTION__KEY` environment overrides on top.

use super::error::{ConfigResult, ConfigurationError};
use super::StepperConfig;
use config::{Config, Environment, File};
use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

const CONFIG_FILE_STEM: &str = "stepper-config";
const ENV_PREFIX: &str = "STEPPER";

/// Loaded configuration together with where it came from
#[derive(Debug)]
pub struct ConfigManager {
    config: StepperConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment
    /// This is useful for testing without modifying global environment variables
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(Self::default_config_directory);

        debug!(
            "Loading configuration for environment '{}' from directory: {}",
            environment,
            config_directory.display()
        );

        let config = Self::load_and_merge_config(&config_directory, environment)?;
        config.validate()?;

        info!(
            environment = %environment,
            persist_only_non_passed = config.execution.persist_only_non_passed,
            attachment_quota = config.execution.attachment_quota,
            executor_threads = config.scheduler.executor_threads,
            "Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    /// Wrap an already built configuration, validating it first
    pub fn from_config(config: StepperConfig) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            environment: Self::detect_environment(),
            config_directory: Self::default_config_directory(),
        }))
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &StepperConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &PathBuf {
        &self.config_directory
    }

    /// Current environment from environment variables
    pub fn detect_environment() -> String {
        env::var("STEPPER_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
    }

    fn default_config_directory() -> PathBuf {
        env::var("STEPPER_CONFIG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config"))
    }

    fn load_and_merge_config(
        config_directory: &std::path::Path,
        environment: &str,
    ) -> ConfigResult<StepperConfig> {
        let defaults = Config::try_from(&StepperConfig::default())
            .map_err(|e| ConfigurationError::load_error("defaults", e))?;

        let base_file = config_directory.join(CONFIG_FILE_STEM);
        let env_file = config_directory.join(format!("{CONFIG_FILE_STEM}.{environment}"));

        let merged = Config::builder()
            .add_source(defaults)
            .add_source(File::with_name(&base_file.to_string_lossy()).required(false))
            .add_source(File::with_name(&env_file.to_string_lossy()).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigurationError::load_error(config_directory.display().to_string(), e))?;

        merged
            .try_deserialize::<StepperConfig>()
            .map_err(|e| ConfigurationError::load_error(config_directory.display().to_string(), e))
    }
}
