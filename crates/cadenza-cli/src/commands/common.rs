//! Shared helpers for CLI commands.

use std::path::Path;

use clap::Args;
use cadenza_config::{CadenzaConfig, EngineSettings, default_config_path};

/// Load settings from `path`, or from the user config file if it exists.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<CadenzaConfig> {
    let config = match path {
        Some(path) => CadenzaConfig::load(path)?,
        None => CadenzaConfig::load_or_default(&default_config_path())?,
    };
    Ok(config)
}

/// Engine overrides accepted by commands that execute a graph.
#[derive(Args, Debug, Clone, Default)]
pub struct EngineArgs {
    /// Sample rate in Hz
    #[arg(long)]
    pub sample_rate: Option<u32>,

    /// Frames per block
    #[arg(long)]
    pub block_size: Option<usize>,
}

impl EngineArgs {
    /// Apply the overrides to `base`.
    pub fn apply(&self, base: &EngineSettings) -> anyhow::Result<EngineSettings> {
        let settings = EngineSettings {
            sample_rate: self.sample_rate.unwrap_or(base.sample_rate),
            block_size: self.block_size.unwrap_or(base.block_size),
            ..base.clone()
        };
        if settings.sample_rate == 0 || settings.block_size == 0 {
            anyhow::bail!("sample rate and block size must be non-zero");
        }
        Ok(settings)
    }
}

/// Number of whole blocks covering `seconds` of audio.
pub fn blocks_for(seconds: f64, settings: &EngineSettings) -> u64 {
    let frames = (seconds.max(0.0) * f64::from(settings.sample_rate)).ceil() as u64;
    frames.div_ceil(settings.block_size as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides() {
        let args = EngineArgs {
            sample_rate: Some(44100),
            block_size: None,
        };
        let settings = args.apply(&EngineSettings::default()).unwrap();
        assert_eq!(settings.sample_rate, 44100);
        assert_eq!(settings.block_size, 256);

        let zero = EngineArgs {
            sample_rate: None,
            block_size: Some(0),
        };
        assert!(zero.apply(&EngineSettings::default()).is_err());
    }

    #[test]
    fn test_blocks_for() {
        let settings = EngineSettings {
            sample_rate: 48000,
            block_size: 256,
            ..EngineSettings::default()
        };
        assert_eq!(blocks_for(1.0, &settings), 188);
        assert_eq!(blocks_for(0.0, &settings), 0);
        assert_eq!(blocks_for(0.5, &settings), 94);
    }
}
