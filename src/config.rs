//! Machine configuration.
//!
//! Every field has a default, so an empty JSON object is a valid config:
//! ```json
//! { "memory_size": 256, "load_address": 0, "run_interval_ms": 250, "bus_clear_delay_ms": 0 }
//! ```

use crate::cpu::memory::DEFAULT_MEMORY_SIZE;
use serde::{Serialize, Deserialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

mod defaults {
    /// Delay between automatic steps in run mode.
    pub const RUN_INTERVAL_MS: u64 = 250;

    pub fn memory_size() -> usize {
        super::DEFAULT_MEMORY_SIZE
    }

    pub fn run_interval_ms() -> u64 {
        RUN_INTERVAL_MS
    }
}

/// Tunables for a [`Machine`](crate::machine::Machine).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MachineConfig {
    /// Number of memory cells.
    #[serde(default = "defaults::memory_size")]
    pub memory_size: usize,
    /// Where programs are loaded and where PC starts.
    #[serde(default)]
    pub load_address: i64,
    /// Delay between steps in run mode.
    #[serde(default = "defaults::run_interval_ms")]
    pub run_interval_ms: u64,
    /// How long a bus transaction stays visible after a step. 0 clears at once.
    #[serde(default)]
    pub bus_clear_delay_ms: u64,
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            memory_size: defaults::memory_size(),
            load_address: 0,
            run_interval_ms: defaults::run_interval_ms(),
            bus_clear_delay_ms: 0,
        }
    }
}

impl MachineConfig {
    /// Parse and validate a JSON config.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON config file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    /// Check invariants serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.memory_size == 0 {
            return Err(ConfigError::EmptyMemory);
        }
        if self.run_interval_ms == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        Ok(())
    }

    pub fn run_interval(&self) -> Duration {
        Duration::from_millis(self.run_interval_ms)
    }

    /// `None` when the bus should be cleared immediately.
    pub fn bus_clear_delay(&self) -> Option<Duration> {
        (self.bus_clear_delay_ms > 0).then(|| Duration::from_millis(self.bus_clear_delay_ms))
    }
}

/// Errors that can occur while loading a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("memory_size must be at least 1")]
    EmptyMemory,

    #[error("run_interval_ms must be at least 1")]
    ZeroInterval,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_object_uses_defaults() {
        let config = MachineConfig::from_json("{}").unwrap();
        assert_eq!(config, MachineConfig::default());
        assert_eq!(config.memory_size, 256);
        assert_eq!(config.run_interval(), Duration::from_millis(defaults::RUN_INTERVAL_MS));
        assert_eq!(config.bus_clear_delay(), None);
    }

    #[test]
    fn test_partial_override() {
        let config = MachineConfig::from_json(r#"{"memory_size": 32, "bus_clear_delay_ms": 300}"#).unwrap();
        assert_eq!(config.memory_size, 32);
        assert_eq!(config.bus_clear_delay(), Some(Duration::from_millis(300)));
        assert_eq!(config.load_address, 0);
    }

    #[test]
    fn test_validation() {
        assert!(matches!(
            MachineConfig::from_json(r#"{"memory_size": 0}"#),
            Err(ConfigError::EmptyMemory)
        ));
        assert!(matches!(
            MachineConfig::from_json(r#"{"run_interval_ms": 0}"#),
            Err(ConfigError::ZeroInterval)
        ));
    }

    #[test]
    fn test_unknown_field_rejected() {
        assert!(matches!(
            MachineConfig::from_json(r#"{"memory": 5}"#),
            Err(ConfigError::Json(_))
        ));
    }
}
