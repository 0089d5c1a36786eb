//! cpal-backed driver.
//!
//! Surfaces one cpal host as a driver: device enumeration, legal-value
//! discovery from the host's supported configs, and duplex streaming via
//! separate cpal input/output streams. Streams run f32 samples.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, SampleRate, SupportedBufferSize};
use tracing::{debug, error};

use crate::driver::backend::{DriverBackend, InputCapture, OutputRequest, StreamDesc, StreamHandle};
use crate::driver::device::DeviceInfo;
use crate::driver::registry::DriverId;
use crate::error::{AudioIoError, Result};

/// Rates offered to the user when the device reports continuous ranges.
const STANDARD_RATES: [u32; 11] = [
    8000, 11025, 16000, 22050, 32000, 44100, 48000, 88200, 96000, 176400, 192000,
];

/// Standard rates that fall inside an inclusive device-supported range.
fn rates_in_range(min: u32, max: u32) -> Vec<u32> {
    STANDARD_RATES
        .iter()
        .copied()
        .filter(|&rate| rate >= min && rate <= max)
        .collect()
}

/// Power-of-two block sizes inside an inclusive device-supported range.
fn block_sizes_in_range(min: u32, max: u32) -> Vec<usize> {
    (6..=12)
        .map(|shift| 1usize << shift)
        .filter(|&size| size as u32 >= min && size as u32 <= max)
        .collect()
}

pub struct CpalBackend {
    driver: DriverId,
    host: cpal::Host,
    name: String,
}

impl CpalBackend {
    pub fn new(driver: DriverId, host: cpal::Host) -> Self {
        let name = host.id().name().to_string();
        Self { driver, host, name }
    }

    /// Output and input channel counts a device reports, zero when a
    /// direction is absent.
    fn channel_counts(device: &cpal::Device) -> (usize, usize) {
        let out = device
            .default_output_config()
            .map(|c| c.channels() as usize)
            .unwrap_or(0);
        let inp = device
            .default_input_config()
            .map(|c| c.channels() as usize)
            .unwrap_or(0);
        (out, inp)
    }

    /// Re-enumerate and return the device at `index`.
    ///
    /// Enumeration order is the host's; indices are only stable within the
    /// current device set.
    fn device_at(&self, index: usize) -> Result<cpal::Device> {
        let devices = self.host.devices().map_err(|e| AudioIoError::DriverUnavailable {
            driver: self.driver,
            reason: e.to_string(),
        })?;
        let mut next = 0;
        for device in devices {
            let (out, inp) = Self::channel_counts(&device);
            if out.max(inp) == 0 {
                continue;
            }
            if next == index {
                return Ok(device);
            }
            next += 1;
        }
        Err(AudioIoError::UnknownDevice(index))
    }

    /// Pick a fixed buffer size when the device supports it, otherwise let
    /// the host choose.
    fn buffer_size_for(supported: &SupportedBufferSize, block_size: usize) -> BufferSize {
        match supported {
            SupportedBufferSize::Range { min, max }
                if block_size as u32 >= *min && block_size as u32 <= *max =>
            {
                BufferSize::Fixed(block_size as u32)
            }
            _ => {
                debug!(block_size, "device does not take a fixed block size");
                BufferSize::Default
            }
        }
    }
}

impl DriverBackend for CpalBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn devices(&self) -> Result<Vec<DeviceInfo>> {
        let devices = self.host.devices().map_err(|e| AudioIoError::DriverUnavailable {
            driver: self.driver,
            reason: e.to_string(),
        })?;
        let mut infos = Vec::new();
        for device in devices {
            let (out, inp) = Self::channel_counts(&device);
            let channels = out.max(inp);
            if channels == 0 {
                continue;
            }
            infos.push(DeviceInfo {
                index: infos.len(),
                name: device.name().unwrap_or_else(|_| "Unknown".to_string()),
                channels,
            });
        }
        Ok(infos)
    }

    fn sample_rates(&self, device_index: usize) -> Result<Vec<u32>> {
        let device = self.device_at(device_index)?;
        let mut rates = Vec::new();
        if let Ok(configs) = device.supported_output_configs() {
            for range in configs {
                rates.extend(rates_in_range(
                    range.min_sample_rate().0,
                    range.max_sample_rate().0,
                ));
            }
        }
        if rates.is_empty() {
            if let Ok(configs) = device.supported_input_configs() {
                for range in configs {
                    rates.extend(rates_in_range(
                        range.min_sample_rate().0,
                        range.max_sample_rate().0,
                    ));
                }
            }
        }
        rates.sort_unstable();
        rates.dedup();
        Ok(rates)
    }

    fn block_sizes(&self, device_index: usize) -> Result<Vec<usize>> {
        let device = self.device_at(device_index)?;
        let supported = device
            .default_output_config()
            .or_else(|_| device.default_input_config())
            .map_err(|e| AudioIoError::DeviceOpenFailed(e.to_string()))?;
        match supported.buffer_size() {
            SupportedBufferSize::Range { min, max } => Ok(block_sizes_in_range(*min, *max)),
            // The device dictates its own buffer size.
            SupportedBufferSize::Unknown => Ok(Vec::new()),
        }
    }

    fn open_stream(&mut self, desc: StreamDesc) -> Result<Box<dyn StreamHandle>> {
        let device = self.device_at(desc.device_index)?;
        let mut streams = Vec::new();

        if let Some(mut cb) = desc.output {
            let supported = device
                .default_output_config()
                .map_err(|e| AudioIoError::DeviceOpenFailed(e.to_string()))?;
            let channels = supported.channels();
            let config = cpal::StreamConfig {
                channels,
                sample_rate: SampleRate(desc.sample_rate),
                buffer_size: Self::buffer_size_for(supported.buffer_size(), desc.block_size),
            };
            let ch = channels as usize;
            let stream = device
                .build_output_stream(
                    &config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        cb(OutputRequest {
                            samples: data,
                            channels: ch,
                        });
                    },
                    |err| error!("audio output stream error: {}", err),
                    None,
                )
                .map_err(|e| AudioIoError::DeviceOpenFailed(e.to_string()))?;
            streams.push(stream);
        }

        if let Some(mut cb) = desc.input {
            match device.default_input_config() {
                Ok(supported) => {
                    let channels = supported.channels();
                    let config = cpal::StreamConfig {
                        channels,
                        sample_rate: SampleRate(desc.sample_rate),
                        buffer_size: Self::buffer_size_for(supported.buffer_size(), desc.block_size),
                    };
                    let ch = channels as usize;
                    let built = device.build_input_stream(
                        &config,
                        move |data: &[f32], _: &cpal::InputCallbackInfo| {
                            cb(InputCapture {
                                samples: data,
                                channels: ch,
                            });
                        },
                        |err| error!("audio input stream error: {}", err),
                        None,
                    );
                    match built {
                        Ok(stream) => streams.push(stream),
                        // Output-only devices are common; capture is optional.
                        Err(e) => debug!("input stream unavailable: {}", e),
                    }
                }
                Err(e) => debug!("device has no input side: {}", e),
            }
        }

        if streams.is_empty() {
            return Err(AudioIoError::DeviceOpenFailed(
                "no stream direction available".to_string(),
            ));
        }

        for stream in &streams {
            stream
                .play()
                .map_err(|e| AudioIoError::DeviceOpenFailed(e.to_string()))?;
        }

        Ok(Box::new(CpalStreamHandle { streams }))
    }
}

struct CpalStreamHandle {
    streams: Vec<cpal::Stream>,
}

impl StreamHandle for CpalStreamHandle {
    fn is_active(&self) -> bool {
        !self.streams.is_empty()
    }

    fn stop(&mut self) -> Result<()> {
        for stream in &self.streams {
            stream
                .pause()
                .map_err(|_| AudioIoError::StreamTeardownTimeout)?;
        }
        // Dropping the streams joins the host's callback threads.
        self.streams.clear();
        Ok(())
    }
}
