//! Configuration loading helpers.

use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::epoch::EpochConfig;

/// Errors returned by configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// I/O error while reading config files.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parse error.
    #[error("toml parse error: {0}")]
    Toml(#[from] toml::de::Error),
    /// Invalid value for a key.
    #[error("invalid value for {key}: {value}")]
    InvalidValue {
        /// Configuration key.
        key: String,
        /// Raw value string.
        value: String,
    },
    /// Unknown configuration key.
    #[error("unknown config key: {0}")]
    UnknownKey(String),
}

/// Top-level configuration schema.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OxiepochConfig {
    /// Epoch advancement configuration.
    pub epoch: Option<EpochConfigSpec>,
}

impl OxiepochConfig {
    /// Load configuration from a TOML file.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Load configuration from the `OXIEPOCH_CONFIG` env var (if set),
    /// then apply `OXIEPOCH__section__field` overrides.
    pub fn load_from_env() -> Result<Self, ConfigError> {
        let config_path = env::var("OXIEPOCH_CONFIG").ok();
        let mut config = match config_path {
            Some(path) => Self::load_from_path(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Apply environment overrides in-place.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        for (key, value) in env::vars() {
            if !key.starts_with("OXIEPOCH__") {
                continue;
            }
            let path = key["OXIEPOCH__".len()..].to_ascii_lowercase();
            let parts: Vec<&str> = path.split("__").collect();
            let value = value.trim().to_string();

            match parts.as_slice() {
                ["epoch", "length_ms"] => {
                    self.epoch_mut().length_ms = Some(parse_value(&key, &value)?);
                }
                _ => return Err(ConfigError::UnknownKey(key)),
            }
        }

        Ok(())
    }

    /// Build an `EpochConfig` using defaults plus overrides.
    pub fn to_epoch_config(&self) -> EpochConfig {
        let mut config = EpochConfig::default();
        if let Some(epoch) = &self.epoch {
            epoch.apply_to(&mut config);
        }
        config
    }

    fn epoch_mut(&mut self) -> &mut EpochConfigSpec {
        if self.epoch.is_none() {
            self.epoch = Some(EpochConfigSpec::default());
        }
        self.epoch.as_mut().expect("epoch config")
    }
}

/// Epoch configuration overrides.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EpochConfigSpec {
    /// Interval between global epoch ticks, in milliseconds.
    pub length_ms: Option<u64>,
}

impl EpochConfigSpec {
    fn apply_to(&self, config: &mut EpochConfig) {
        if let Some(value) = self.length_ms {
            config.epoch_length = Duration::from_millis(value.max(1));
        }
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}
