use serde::Deserialize;
use std::path::Path;

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ZeroConfig {
    #[serde(default = "defaults::shm_file_path")]
    pub shm_file_path: String,
    #[serde(default = "defaults::log_level")]
    pub log_level: String,
    #[serde(default = "defaults::slot_count")]
    pub slot_count: usize,
    #[serde(default = "defaults::event_count")]
    pub event_count: u64,
    #[serde(default = "defaults::attach_timeout_ms")]
    pub attach_timeout_ms: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read '{path}'")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config")]
    Parse(#[from] toml::de::Error),
}

mod defaults {
    pub fn shm_file_path() -> String {
        "/tmp/zero_ring_bus".into()
    }

    pub fn log_level() -> String {
        "info".into()
    }

    pub fn slot_count() -> usize {
        1 << 16 // 65536
    }

    pub fn event_count() -> u64 {
        1_000_000
    }

    pub fn attach_timeout_ms() -> u64 {
        5_000
    }
}

impl Default for ZeroConfig {
    fn default() -> Self {
        Self {
            shm_file_path: defaults::shm_file_path(),
            log_level: defaults::log_level(),
            slot_count: defaults::slot_count(),
            event_count: defaults::event_count(),
            attach_timeout_ms: defaults::attach_timeout_ms(),
        }
    }
}

impl ZeroConfig {
    pub fn load(path: impl AsRef<Path> + ToString) -> Result<Self, ConfigError> {
        let toml_to_str = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        Self::parse(&toml_to_str)
    }

    pub fn parse(toml_str: &str) -> Result<Self, ConfigError> {
        let zero_config: ZeroConfig = toml::from_str(toml_str)?;
        Ok(zero_config)
    }
}
