//! Error types for the audio I/O layer.
//!
//! Validation errors are returned to the configuration caller and never
//! change stream state. Open and teardown failures move the stream to
//! `Failed`. Underruns and overruns are counted, not raised (see
//! `stream::exchange`).

use crate::driver::DriverId;

/// Errors that can occur while enumerating, configuring, or streaming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioIoError {
    /// The backend library/service behind a driver could not be initialized.
    DriverUnavailable { driver: DriverId, reason: String },
    /// No driver with this id is registered.
    UnknownDriver(DriverId),
    /// No device with this index exists in the current enumeration.
    UnknownDevice(usize),
    /// The device refused to open or start a stream (busy, driver error).
    DeviceOpenFailed(String),
    /// Requested sample rate is not in the device's legal set.
    InvalidSampleRate { requested: u32 },
    /// Requested block size is not in the device's legal set.
    InvalidBlockSize { requested: usize },
    /// Channel offset is not a legal window start for the device.
    InvalidChannelOffset { requested: usize, channels: usize },
    /// The real-time callback did not acknowledge stop within the bound.
    StreamTeardownTimeout,
}

impl std::fmt::Display for AudioIoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AudioIoError::DriverUnavailable { driver, reason } => {
                write!(f, "Audio driver {} unavailable: {}", driver, reason)
            }
            AudioIoError::UnknownDriver(driver) => {
                write!(f, "Unknown audio driver: {}", driver)
            }
            AudioIoError::UnknownDevice(device) => {
                write!(f, "Unknown audio device: {}", device)
            }
            AudioIoError::DeviceOpenFailed(msg) => {
                write!(f, "Failed to open audio device: {}", msg)
            }
            AudioIoError::InvalidSampleRate { requested } => {
                write!(f, "Sample rate {} Hz not supported by device", requested)
            }
            AudioIoError::InvalidBlockSize { requested } => {
                write!(f, "Block size {} not supported by device", requested)
            }
            AudioIoError::InvalidChannelOffset { requested, channels } => {
                write!(
                    f,
                    "Channel offset {} invalid for device with {} channels",
                    requested, channels
                )
            }
            AudioIoError::StreamTeardownTimeout => {
                write!(f, "Audio stream did not stop within the teardown bound")
            }
        }
    }
}

impl std::error::Error for AudioIoError {}

/// Result type alias for audio I/O operations.
pub type Result<T> = std::result::Result<T, AudioIoError>;
