//! Configuration loading for the TTS bridge
//!
//! Builds a [`TTSConfig`] from YAML files and environment variables.
//! Priority: YAML > ENV vars > .env values > defaults. The `.env` file is
//! loaded by the binary at startup, so it only ever shows up here as
//! ordinary environment variables.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//! - `merge`: Merging YAML and environment configurations
//!
//! # Example
//! ```rust,no_run
//! use cosy_tts_bridge::core::tts::TTSConfig;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = TTSConfig::from_env()?;
//!
//! // Load from YAML file with environment variable base
//! let config = TTSConfig::from_file(Path::new("config.yaml"))?;
//! println!("voice: {}", config.voice);
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use thiserror::Error;

mod env;
mod merge;
mod yaml;

pub use env::{
    ENV_API_KEY, ENV_BASE_URL, ENV_MODEL, ENV_SAMPLE_RATE, ENV_VOICE, ENV_WS_URL, EnvConfig,
};
pub use yaml::{TtsYaml, YamlConfig};

use crate::core::tts::TTSConfig;

/// Errors raised while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Invalid configuration: {0}")]
    Validation(String),
}

impl TTSConfig {
    /// Load configuration from environment variables over defaults.
    ///
    /// # Errors
    /// Returns an error if a variable has an invalid format or the resulting
    /// configuration fails validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = merge::merge_config(None, EnvConfig::load()?);
        config.validate().map_err(ConfigError::Validation)?;
        Ok(config)
    }

    /// Load configuration from a YAML file with environment variable base.
    ///
    /// Priority order (highest to lowest):
    /// 1. YAML file values
    /// 2. Environment variables
    /// 3. Default values
    ///
    /// # Errors
    /// Returns an error if:
    /// - The YAML file cannot be read or is malformed
    /// - Environment variables have invalid formats
    /// - Configuration validation fails
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let yaml_config = YamlConfig::from_file(path)?;
        let config = merge::merge_config(Some(yaml_config), EnvConfig::load()?);
        config.validate().map_err(ConfigError::Validation)?;
        Ok(config)
    }
}
