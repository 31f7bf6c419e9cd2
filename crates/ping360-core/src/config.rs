//! Driver configuration stored as JSON

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;
use thiserror::Error;

use crate::sensor::{DEFAULT_BAUD_RATES, DEFAULT_SPEED_OF_SOUND, PROBES_PER_ROUND};

/// Errors loading or validating a [`DriverConfig`]
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Timing and search parameters for one driver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Profile request timeout in milliseconds
    pub sensor_timeout_ms: u64,

    /// Device information probe timeout during baud detection, in milliseconds
    pub baud_probe_interval_ms: u64,

    /// Probes sent per candidate rate before it is scored
    pub probes_per_round: u32,

    /// Candidate rates in search order; the last one is the fallback
    pub baud_rates: Vec<u32>,

    /// Speed of sound in water (m/s), used for the range estimate
    pub speed_of_sound: f64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            sensor_timeout_ms: 1000,
            baud_probe_interval_ms: 100,
            probes_per_round: PROBES_PER_ROUND,
            baud_rates: DEFAULT_BAUD_RATES.to_vec(),
            speed_of_sound: DEFAULT_SPEED_OF_SOUND,
        }
    }
}

impl DriverConfig {
    /// Load and validate a configuration file; missing keys take their defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sensor_timeout_ms == 0 {
            return Err(ConfigError::Invalid("sensor_timeout_ms must be positive".into()));
        }
        if self.baud_probe_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "baud_probe_interval_ms must be positive".into(),
            ));
        }
        if self.probes_per_round == 0 {
            return Err(ConfigError::Invalid("probes_per_round must be positive".into()));
        }
        if self.baud_rates.is_empty() {
            return Err(ConfigError::Invalid("baud_rates is empty".into()));
        }
        if let Some(rate) = self.baud_rates.iter().find(|&&rate| rate == 0) {
            return Err(ConfigError::Invalid(format!("invalid baud rate {rate}")));
        }
        if !self.speed_of_sound.is_finite() || self.speed_of_sound <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "invalid speed of sound {}",
                self.speed_of_sound
            )));
        }
        Ok(())
    }
}
