//! Engine and stream settings.
//!
//! Settings are stored as TOML. Every field has a default, so a partial file
//! (or none at all) is valid:
//!
//! ```toml
//! [engine]
//! sample_rate = 44100
//! block_size = 128
//! fault_policy = "disable"
//!
//! [stream]
//! poll_interval_ms = 20
//! ```

use std::path::Path;
use std::time::Duration;

use cadenza_core::ATOM_HEADER_LEN;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Upper bound for the stream poll interval.
const MAX_POLL_INTERVAL_MS: u64 = 60_000;

/// What the engine does when a block fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FaultPolicy {
    /// Abort the process.
    #[default]
    Abort,
    /// Drop the installed program, report the pipeline as disabled, and end
    /// the engine thread. A new engine must be started to resume.
    Disable,
}

/// Processing engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Frames per processing block.
    pub block_size: usize,
    /// Capacity in bytes of each event (atom) buffer.
    pub atom_capacity: usize,
    /// Sleep between checks while no program or backend is installed.
    pub idle_sleep_ms: u64,
    /// Reaction to a failed block.
    pub fault_policy: FaultPolicy,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            block_size: 256,
            atom_capacity: 4096,
            idle_sleep_ms: 10,
            fault_policy: FaultPolicy::Abort,
        }
    }
}

impl EngineSettings {
    /// Idle sleep as a duration.
    pub fn idle_sleep(&self) -> Duration {
        Duration::from_millis(self.idle_sleep_ms)
    }

    /// Duration of one block at the configured rate.
    #[allow(clippy::cast_precision_loss)]
    pub fn block_duration(&self) -> Duration {
        Duration::from_secs_f64(self.block_size as f64 / f64::from(self.sample_rate.max(1)))
    }
}

/// Framed stream settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSettings {
    /// How long a blocked read or write waits before re-checking the close flag.
    pub poll_interval_ms: u64,
    /// Largest accepted frame payload in bytes.
    pub max_frame_len: usize,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 50,
            max_frame_len: 64 * 1024 * 1024,
        }
    }
}

impl StreamSettings {
    /// Poll interval as a duration.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CadenzaConfig {
    /// Engine settings.
    pub engine: EngineSettings,
    /// Stream settings.
    pub stream: StreamSettings,
}

impl CadenzaConfig {
    /// Load and validate a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
        Self::from_toml_str(&content)
    }

    /// Save to a file, creating the parent directory if needed.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(|e| ConfigError::create_dir(parent, e))?;
            }
        }
        let content = self.to_toml()?;
        std::fs::write(path, content).map_err(|e| ConfigError::write_file(path, e))
    }

    /// Parse and validate TOML text.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to pretty TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check every setting is in range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let engine = &self.engine;
        if engine.sample_rate == 0 {
            return Err(ConfigError::invalid("engine.sample_rate", "must be non-zero"));
        }
        if engine.block_size == 0 {
            return Err(ConfigError::invalid("engine.block_size", "must be non-zero"));
        }
        if engine.atom_capacity < ATOM_HEADER_LEN {
            return Err(ConfigError::invalid(
                "engine.atom_capacity",
                format!("must be at least {ATOM_HEADER_LEN} bytes"),
            ));
        }

        let stream = &self.stream;
        if !(1..=MAX_POLL_INTERVAL_MS).contains(&stream.poll_interval_ms) {
            return Err(ConfigError::invalid(
                "stream.poll_interval_ms",
                format!("must be between 1 and {MAX_POLL_INTERVAL_MS}"),
            ));
        }
        if stream.max_frame_len == 0 {
            return Err(ConfigError::invalid("stream.max_frame_len", "must be non-zero"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = CadenzaConfig::default();
        config.validate().unwrap();
        assert_eq!(config.engine.sample_rate, 48000);
        assert_eq!(config.engine.block_size, 256);
        assert_eq!(config.engine.fault_policy, FaultPolicy::Abort);
        assert_eq!(config.stream.poll_interval(), Duration::from_millis(50));
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = CadenzaConfig::from_toml_str(
            r#"
            [engine]
            block_size = 64
            fault_policy = "disable"
            "#,
        )
        .unwrap();
        assert_eq!(config.engine.block_size, 64);
        assert_eq!(config.engine.sample_rate, 48000);
        assert_eq!(config.engine.fault_policy, FaultPolicy::Disable);
        assert_eq!(config.stream, StreamSettings::default());
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        for (toml, field) in [
            ("[engine]\nsample_rate = 0", "engine.sample_rate"),
            ("[engine]\nblock_size = 0", "engine.block_size"),
            ("[engine]\natom_capacity = 4", "engine.atom_capacity"),
            ("[stream]\npoll_interval_ms = 0", "stream.poll_interval_ms"),
            ("[stream]\nmax_frame_len = 0", "stream.max_frame_len"),
        ] {
            match CadenzaConfig::from_toml_str(toml) {
                Err(ConfigError::InvalidSetting { field: f, .. }) => assert_eq!(f, field),
                other => panic!("expected {field} to be rejected, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_unknown_policy_is_parse_error() {
        let err = CadenzaConfig::from_toml_str("[engine]\nfault_policy = \"retry\"").unwrap_err();
        assert!(matches!(err, ConfigError::TomlParse(_)));
    }

    #[test]
    fn test_block_duration() {
        let engine = EngineSettings {
            sample_rate: 48000,
            block_size: 480,
            ..Default::default()
        };
        assert_eq!(engine.block_duration(), Duration::from_millis(10));
    }
}
