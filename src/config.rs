// src/config.rs

//! Monitor configuration, loaded from YAML.
//!
//! Every field has a default, so an empty file (or a file naming only a few
//! fields) is a valid configuration. Unknown fields are ignored so older files
//! keep loading.
//!
//! ```yaml
//! log_dir: /mnt/sd/co2_log
//! interval_sec: 10
//! checkpoint_every: 10
//! ```

use crate::common::SlaveAddr;
use log::debug;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Errors raised while loading or validating a [`MonitorConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to access configuration file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_yml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Directory holding the CSV session files and the state record.
    pub log_dir: PathBuf,

    /// File name of the persistent session record, relative to `log_dir`.
    pub state_file: String,

    /// Sampling interval used when a session is started without one.
    pub interval_sec: u32,

    /// Persist a checkpoint after every this many samples.
    pub checkpoint_every: u32,

    /// Unix time before which a clock reading is treated as a reset clock.
    /// Default 2020-01-01T00:00:00Z.
    pub clock_plausible_after: i64,

    /// Readings at or above this concentration are flagged as alarms.
    pub alarm_threshold_ppm: u16,

    /// Granularity of the sampler's sleep, i.e. how quickly it notices a stop request.
    pub stop_poll_ms: u64,

    /// Modbus address of the sensor. 0xFE reaches a lone sensor at any address.
    pub slave_address: u8,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("co2_log"),
            state_file: ".session_state".to_string(),
            interval_sec: 5,
            checkpoint_every: 10,
            clock_plausible_after: 1_577_836_800,
            alarm_threshold_ppm: 1000,
            stop_poll_ms: 50,
            slave_address: 0xFE,
        }
    }
}

impl MonitorConfig {
    /// Loads and validates a configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        debug!("Loading configuration from {:?}", path);
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&contents)
    }

    pub fn from_yaml_str(contents: &str) -> Result<Self, ConfigError> {
        // serde_yml rejects an empty document, which should mean "all defaults".
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: MonitorConfig = serde_yml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Writes the configuration as YAML.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let yaml = serde_yml::to_string(self)?;
        fs::write(path, yaml).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_sec == 0 {
            return Err(ConfigError::Invalid("interval_sec must be at least 1".into()));
        }
        if self.checkpoint_every == 0 {
            return Err(ConfigError::Invalid("checkpoint_every must be at least 1".into()));
        }
        if self.stop_poll_ms == 0 {
            return Err(ConfigError::Invalid("stop_poll_ms must be at least 1".into()));
        }
        if self.state_file.is_empty() || self.state_file.contains(['/', '\\']) {
            return Err(ConfigError::Invalid(format!(
                "state_file must be a plain file name, got {:?}",
                self.state_file
            )));
        }
        SlaveAddr::new(self.slave_address).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        Ok(())
    }

    /// Full path of the state record.
    pub fn state_path(&self) -> PathBuf {
        self.log_dir.join(&self.state_file)
    }

    /// Sensor address as a validated [`SlaveAddr`], falling back to "any sensor".
    pub fn slave(&self) -> SlaveAddr {
        SlaveAddr::new(self.slave_address).unwrap_or(SlaveAddr::ANY)
    }
}
