//! Runtime configuration loaded from a TOML file.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::Deserialize;
use thiserror::Error;
use url::Url;
use crate::core::{CompressionOptions, ManagerConfig};
use crate::uploaders::MultipartConfig;

pub const DEFAULT_CONFIG_PATH: &str = "pixdrop.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// 上传地址
    pub endpoint: String,
    pub timeout_secs: u64,
    pub chunk_size: usize,
    pub event_capacity: usize,
    pub compression: CompressionOptions,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:3333/uploads".to_string(),
            timeout_secs: 300,
            chunk_size: 64 * 1024,
            event_capacity: 256,
            compression: CompressionOptions::default(),
        }
    }
}

impl Config {
    /// Reads and validates the file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Like [`Config::load`], but a missing file yields the defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
        match Self::load(&path) {
            Err(ConfigError::Io { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
                Ok(Config::default())
            }
            other => other,
        }
    }

    pub fn from_toml(content: &str) -> Result<Config, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = Url::parse(&self.endpoint)
            .map_err(|err| ConfigError::Invalid(format!("endpoint {:?}: {}", self.endpoint, err)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid(format!(
                "endpoint must use http or https, got {}",
                url.scheme()
            )));
        }

        let quality = self.compression.quality;
        if !(0.0..=1.0).contains(&quality) {
            return Err(ConfigError::Invalid(format!("quality must be within 0..=1, got {}", quality)));
        }
        if self.compression.max_width == 0 || self.compression.max_height == 0 {
            return Err(ConfigError::Invalid("max_width and max_height must be positive".into()));
        }
        if self.chunk_size == 0 {
            return Err(ConfigError::Invalid("chunk_size must be positive".into()));
        }

        Ok(())
    }

    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            compression: self.compression.clone(),
            event_capacity: self.event_capacity,
            ..ManagerConfig::default()
        }
    }

    pub fn multipart_config(&self) -> MultipartConfig {
        MultipartConfig {
            timeout: Duration::from_secs(self.timeout_secs),
            chunk_size: self.chunk_size,
        }
    }
}
