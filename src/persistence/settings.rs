//! Audio selection save/restore.
//!
//! The audio selection (driver, device, channel window, sample rate, block
//! size) is stored by *name*: device indices are only stable within a
//! driver session, so a restore re-resolves names against the current
//! enumeration. Anything that no longer resolves, or is no longer legal,
//! is skipped with a warning rather than failing the whole restore.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::driver::device::MAX_CHANNELS;
use crate::error::Result;
use crate::stream::audio_stream::AudioStream;

/// Current settings format version.
/// Increment this when making breaking changes to the format.
pub const SETTINGS_VERSION: u32 = 1;

/// A saved audio selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioSettings {
    /// Settings format version for future compatibility.
    pub version: u32,
    /// Driver display name, if one was selected.
    pub driver: Option<String>,
    /// Device display name, if one was selected.
    pub device: Option<String>,
    pub channel_offset: usize,
    pub sample_rate: u32,
    pub block_size: usize,
}

impl AudioSettings {
    /// Snapshot the current selection of a stream.
    pub fn capture(stream: &AudioStream) -> Self {
        let config = stream.config();
        let driver = stream
            .drivers()
            .into_iter()
            .find(|d| d.id == config.driver)
            .map(|d| d.name);
        let device = config
            .device
            .and_then(|index| stream.device_info(index))
            .map(|info| info.name);
        Self {
            version: SETTINGS_VERSION,
            driver,
            device,
            channel_offset: config.channel_offset,
            sample_rate: config.sample_rate,
            block_size: config.block_size,
        }
    }

    /// Check if this settings version is compatible with the current format.
    pub fn is_compatible(&self) -> bool {
        self.version <= SETTINGS_VERSION
    }

    /// Re-apply this selection to a stream, best effort.
    ///
    /// Stale names and no-longer-legal values are skipped with a warning;
    /// real stream errors (open failures) propagate.
    pub fn apply(&self, stream: &mut AudioStream) -> Result<()> {
        if let Some(name) = &self.driver {
            match stream.drivers().into_iter().find(|d| d.name == *name) {
                Some(driver) => stream.set_driver(driver.id)?,
                None => warn!("saved audio driver {:?} is not present", name),
            }
        }

        let Some(name) = &self.device else {
            return Ok(());
        };
        let Some(info) = stream
            .devices()?
            .into_iter()
            .find(|info| info.name == *name)
        else {
            warn!("saved audio device {:?} is not present", name);
            return Ok(());
        };

        let offset = if self.channel_offset % MAX_CHANNELS == 0 && self.channel_offset < info.channels
        {
            self.channel_offset
        } else {
            warn!(
                "saved channel offset {} does not fit {:?}; using 0",
                self.channel_offset, info.name
            );
            0
        };
        stream.set_device(Some(info.index), offset)?;

        if stream.sample_rates().contains(&self.sample_rate) {
            stream.set_sample_rate(self.sample_rate)?;
        } else if !stream.sample_rates().is_empty() {
            warn!("saved sample rate {} no longer legal", self.sample_rate);
        }
        if stream.block_sizes().contains(&self.block_size) {
            stream.set_block_size(self.block_size)?;
        } else if !stream.block_sizes().is_empty() {
            warn!("saved block size {} no longer legal", self.block_size);
        }
        Ok(())
    }
}

/// Error type for settings file operations.
#[derive(Debug)]
pub enum SettingsError {
    /// File I/O error.
    Io(std::io::Error),
    /// JSON serialization/deserialization error.
    Json(serde_json::Error),
}

impl std::fmt::Display for SettingsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SettingsError::Io(e) => write!(f, "settings file error: {}", e),
            SettingsError::Json(e) => write!(f, "settings format error: {}", e),
        }
    }
}

impl std::error::Error for SettingsError {}

impl From<std::io::Error> for SettingsError {
    fn from(e: std::io::Error) -> Self {
        SettingsError::Io(e)
    }
}

impl From<serde_json::Error> for SettingsError {
    fn from(e: serde_json::Error) -> Self {
        SettingsError::Json(e)
    }
}

/// Write a selection to a JSON file.
pub fn save_to_file(settings: &AudioSettings, path: &Path) -> std::result::Result<(), SettingsError> {
    let json = serde_json::to_string_pretty(settings)?;
    std::fs::write(path, json)?;
    Ok(())
}

/// Read a selection back from a JSON file.
pub fn load_from_file(path: &Path) -> std::result::Result<AudioSettings, SettingsError> {
    let json = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&json)?)
}
