//! Stream configuration and validation.
//!
//! A `StreamConfig` is the validated tuple of driver, device, channel
//! offset, sample rate, and block size. Proposals check a requested change
//! against the device's currently reported legal values and either produce
//! the changed config or a typed rejection. A device that reports no legal
//! values dictates its own; external requests are then ignored, not
//! rejected.

use crate::driver::device::MAX_CHANNELS;
use crate::driver::registry::DriverId;
use crate::error::{AudioIoError, Result};

/// Summary shown when no device is selected.
pub const NO_DEVICE_LABEL: &str = "(No device)";

/// Summary shown when a device reports no selectable values.
pub const LOCKED_BY_DEVICE_LABEL: &str = "(Locked by device)";

/// The full configuration of one audio stream.
///
/// `device: None` means the stream is configured but inactive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    pub driver: DriverId,
    pub device: Option<usize>,
    pub channel_offset: usize,
    pub sample_rate: u32,
    pub block_size: usize,
}

impl StreamConfig {
    /// Starting configuration for a driver: no device selected, common
    /// defaults for rate and block size.
    pub fn new(driver: DriverId) -> Self {
        Self {
            driver,
            device: None,
            channel_offset: 0,
            sample_rate: 44100,
            block_size: 256,
        }
    }
}

/// Outcome of a configuration proposal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Proposal {
    /// The change is legal; this is the resulting configuration.
    Accepted(StreamConfig),
    /// The device reports no selectable values for this parameter; the
    /// request is dropped and the current value kept.
    Ignored,
}

impl StreamConfig {
    /// Propose a new sample rate against the device's legal set.
    pub fn propose_sample_rate(&self, legal: &[u32], sample_rate: u32) -> Result<Proposal> {
        if legal.is_empty() {
            return Ok(Proposal::Ignored);
        }
        if !legal.contains(&sample_rate) {
            return Err(AudioIoError::InvalidSampleRate {
                requested: sample_rate,
            });
        }
        Ok(Proposal::Accepted(StreamConfig {
            sample_rate,
            ..self.clone()
        }))
    }

    /// Propose a new block size against the device's legal set.
    pub fn propose_block_size(&self, legal: &[usize], block_size: usize) -> Result<Proposal> {
        if legal.is_empty() {
            return Ok(Proposal::Ignored);
        }
        if !legal.contains(&block_size) {
            return Err(AudioIoError::InvalidBlockSize {
                requested: block_size,
            });
        }
        Ok(Proposal::Accepted(StreamConfig {
            block_size,
            ..self.clone()
        }))
    }

    /// Propose a device selection with a channel offset.
    ///
    /// `channels` is the target device's total channel count (unused for
    /// `None`). Deselecting is always legal and resets the offset.
    pub fn propose_device(
        &self,
        channels: usize,
        device: Option<usize>,
        offset: usize,
    ) -> Result<Proposal> {
        if device.is_none() {
            return Ok(Proposal::Accepted(StreamConfig {
                device: None,
                channel_offset: 0,
                ..self.clone()
            }));
        }
        if offset % MAX_CHANNELS != 0 || offset >= channels {
            return Err(AudioIoError::InvalidChannelOffset {
                requested: offset,
                channels,
            });
        }
        Ok(Proposal::Accepted(StreamConfig {
            device,
            channel_offset: offset,
            ..self.clone()
        }))
    }
}

/// Sample-rate summary, trailing zeros trimmed: `44.1 kHz`, `48 kHz`.
pub fn sample_rate_label(sample_rate: u32) -> String {
    format!("{} kHz", sample_rate as f32 / 1000.0)
}

/// Block-size summary with the latency it implies: `256 (5.8 ms)`.
pub fn block_size_label(block_size: usize, sample_rate: u32) -> String {
    if sample_rate == 0 {
        return format!("{}", block_size);
    }
    let latency_ms = block_size as f32 / sample_rate as f32 * 1000.0;
    format!("{} ({:.1} ms)", block_size, latency_ms)
}
