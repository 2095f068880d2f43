//! Mixer configuration
//!
//! Configuration can be built directly, parsed from TOML, or loaded from a
//! TOML file. Every field has a sensible default, so an empty document is a
//! valid configuration.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::debug;

/// Output device and mixing configuration
///
/// # Example
///
/// ```ignore
/// let config = MixerConfig::new(44100, 2, 1024);
/// let mixer = Mixer::open(config)?;
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct MixerConfig {
    /// Output sample rate in Hz
    #[serde(default = "default_frequency")]
    pub frequency: u32,

    /// Output channel count (1 = mono, 2 = stereo)
    #[serde(default = "default_channels")]
    pub channels: u16,

    /// Device buffer size in frames
    ///
    /// Smaller buffers lower latency at the cost of underrun risk.
    #[serde(default = "default_buffer_frames")]
    pub buffer_frames: u32,

    /// Output device name; `None` selects the system default
    #[serde(default)]
    pub device: Option<String>,
}

fn default_frequency() -> u32 {
    44100
}

fn default_channels() -> u16 {
    2
}

fn default_buffer_frames() -> u32 {
    1024
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self {
            frequency: default_frequency(),
            channels: default_channels(),
            buffer_frames: default_buffer_frames(),
            device: None,
        }
    }
}

impl MixerConfig {
    /// Build a configuration from the three core device parameters
    pub fn new(frequency: u32, channels: u16, buffer_frames: u32) -> Self {
        Self {
            frequency,
            channels,
            buffer_frames,
            device: None,
        }
    }

    /// Parse a configuration from a TOML document
    pub fn from_toml_str(toml_str: &str) -> Result<Self> {
        let config: Self = toml::from_str(toml_str)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading config from {}", path.display());
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Check that the configuration describes an openable device
    pub fn validate(&self) -> Result<()> {
        if self.frequency == 0 {
            return Err(Error::Config("frequency must be nonzero".to_string()));
        }
        if self.channels == 0 || self.channels > 2 {
            return Err(Error::Config(format!(
                "channel count must be 1 or 2, got {}",
                self.channels
            )));
        }
        if self.buffer_frames == 0 {
            return Err(Error::Config("buffer size must be nonzero".to_string()));
        }
        Ok(())
    }
}
