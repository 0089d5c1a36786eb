//! Audio device descriptions and channel-window math.
//!
//! A stream addresses at most `MAX_CHANNELS` consecutive channels of a
//! device, starting at a channel offset. Devices with more channels are
//! presented as several offset windows rather than one huge choice.

/// Maximum number of channels a single stream addresses.
///
/// Channel offsets are enumerated in strides of this constant.
pub const MAX_CHANNELS: usize = 8;

/// Enumeration cap so a device with a ridiculous channel count doesn't
/// explode the presented choice list. Such devices are still listed, just
/// truncated to this many channels' worth of offsets.
pub const MAX_TOTAL_CHANNELS: usize = 128;

/// Information about an audio device as reported by a driver.
///
/// The index is stable only within the current driver session; device sets
/// can change between enumerations (hot-plug), so enumeration is re-run on
/// demand and never cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Index in the driver's device list (for selection).
    pub index: usize,
    /// Human-readable device name.
    pub name: String,
    /// Total channel count reported by the device.
    pub channels: usize,
}

impl DeviceInfo {
    /// Number of channels a stream at `offset` would actually use.
    pub fn active_channels(&self, offset: usize) -> usize {
        MAX_CHANNELS.min(self.channels.saturating_sub(offset))
    }

    /// Human label combining the device name and the 1-based channel range
    /// covered by a stream at `offset`, e.g. `"Scarlett 18i20 (9-16)"`.
    pub fn detail(&self, offset: usize) -> String {
        let active = self.active_channels(offset);
        if active == 0 {
            return self.name.clone();
        }
        format!("{} ({}-{})", self.name, offset + 1, offset + active)
    }

    /// Legal channel offsets for this device, in stride order.
    ///
    /// Strides by [`MAX_CHANNELS`] and never exceeds the device's channel
    /// count; counts beyond [`MAX_TOTAL_CHANNELS`] are truncated.
    pub fn channel_offsets(&self) -> Vec<usize> {
        let capped = self.channels.min(MAX_TOTAL_CHANNELS);
        (0..capped).step_by(MAX_CHANNELS).collect()
    }
}
