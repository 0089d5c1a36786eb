//! Hardware-free dummy driver.
//!
//! Serves headless operation and tests: streams run on a named std thread
//! paced at the negotiated block period, invoking the same callback
//! endpoints as the real backends. The thread checks an owned cancellation
//! token between blocks, so teardown is deterministic and bounded.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::driver::backend::{DriverBackend, InputCapture, OutputRequest, StreamDesc, StreamHandle};
use crate::driver::device::DeviceInfo;
use crate::error::{AudioIoError, Result};

/// Worst-case wait for the callback thread to acknowledge stop.
/// Well above any legal block period.
const TEARDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Description of one virtual device exposed by the dummy driver.
#[derive(Debug, Clone)]
pub struct DummyDevice {
    pub name: String,
    pub channels: usize,
    /// Legal sample rates. Empty means the device dictates its own rate.
    pub sample_rates: Vec<u32>,
    /// Legal block sizes. Empty means the device dictates its own size.
    pub block_sizes: Vec<usize>,
}

impl DummyDevice {
    /// A plain stereo device with the usual rate and block-size choices.
    pub fn stereo() -> Self {
        Self {
            name: "Dummy Stereo".to_string(),
            channels: 2,
            sample_rates: vec![44100, 48000, 88200, 96000],
            block_sizes: vec![64, 128, 256, 512, 1024, 2048, 4096],
        }
    }

    /// A 16-channel interface, for exercising channel-offset windows.
    pub fn multichannel() -> Self {
        Self {
            name: "Dummy 16x16".to_string(),
            channels: 16,
            sample_rates: vec![44100, 48000, 88200, 96000],
            block_sizes: vec![64, 128, 256, 512, 1024, 2048, 4096],
        }
    }

    /// A device that reports no selectable values: rate and block size are
    /// fixed by the device and external requests are ignored.
    pub fn fixed() -> Self {
        Self {
            name: "Dummy Fixed".to_string(),
            channels: 2,
            sample_rates: Vec::new(),
            block_sizes: Vec::new(),
        }
    }
}

/// The dummy backend. Devices are virtual; streams are real threads.
pub struct DummyBackend {
    devices: Vec<DummyDevice>,
    /// One busy flag per device. A flag stays set until the stream thread
    /// actually exits, so a wedged teardown keeps the device busy.
    busy: Vec<Arc<AtomicBool>>,
}

impl DummyBackend {
    pub fn new() -> Self {
        Self::with_devices(vec![DummyDevice::stereo(), DummyDevice::multichannel()])
    }

    pub fn with_devices(devices: Vec<DummyDevice>) -> Self {
        let busy = devices
            .iter()
            .map(|_| Arc::new(AtomicBool::new(false)))
            .collect();
        Self { devices, busy }
    }
}

impl Default for DummyBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DriverBackend for DummyBackend {
    fn name(&self) -> &str {
        "Dummy"
    }

    fn devices(&self) -> Result<Vec<DeviceInfo>> {
        Ok(self
            .devices
            .iter()
            .enumerate()
            .map(|(index, dev)| DeviceInfo {
                index,
                name: dev.name.clone(),
                channels: dev.channels,
            })
            .collect())
    }

    fn sample_rates(&self, device_index: usize) -> Result<Vec<u32>> {
        let dev = self
            .devices
            .get(device_index)
            .ok_or(AudioIoError::UnknownDevice(device_index))?;
        Ok(dev.sample_rates.clone())
    }

    fn block_sizes(&self, device_index: usize) -> Result<Vec<usize>> {
        let dev = self
            .devices
            .get(device_index)
            .ok_or(AudioIoError::UnknownDevice(device_index))?;
        Ok(dev.block_sizes.clone())
    }

    fn open_stream(&mut self, desc: StreamDesc) -> Result<Box<dyn StreamHandle>> {
        let dev = self
            .devices
            .get(desc.device_index)
            .ok_or(AudioIoError::UnknownDevice(desc.device_index))?;

        if !dev.sample_rates.is_empty() && !dev.sample_rates.contains(&desc.sample_rate) {
            return Err(AudioIoError::DeviceOpenFailed(format!(
                "{} does not run at {} Hz",
                dev.name, desc.sample_rate
            )));
        }
        if desc.block_size == 0 {
            return Err(AudioIoError::DeviceOpenFailed(
                "zero block size".to_string(),
            ));
        }

        let busy = Arc::clone(&self.busy[desc.device_index]);
        if busy.swap(true, Ordering::AcqRel) {
            return Err(AudioIoError::DeviceOpenFailed(format!(
                "{} is busy",
                dev.name
            )));
        }

        let stop = Arc::new(AtomicBool::new(false));
        let (done_tx, done_rx) = mpsc::channel();
        let channels = dev.channels;
        let block_size = desc.block_size;
        let period = Duration::from_secs_f64(block_size as f64 / desc.sample_rate.max(1) as f64);
        let mut output_cb = desc.output;
        let mut input_cb = desc.input;

        let thread_stop = Arc::clone(&stop);
        let thread_busy = Arc::clone(&busy);
        let thread = thread::Builder::new()
            .name("dummy-audio".to_string())
            .spawn(move || {
                let input = vec![0.0f32; block_size * channels];
                let mut output = vec![0.0f32; block_size * channels];
                while !thread_stop.load(Ordering::Acquire) {
                    if let Some(cb) = input_cb.as_mut() {
                        cb(InputCapture {
                            samples: &input,
                            channels,
                        });
                    }
                    if let Some(cb) = output_cb.as_mut() {
                        output.fill(0.0);
                        cb(OutputRequest {
                            samples: &mut output,
                            channels,
                        });
                    }
                    thread::sleep(period);
                }
                thread_busy.store(false, Ordering::Release);
                let _ = done_tx.send(());
            })
            .map_err(|e| {
                busy.store(false, Ordering::Release);
                AudioIoError::DeviceOpenFailed(format!("failed to spawn stream thread: {}", e))
            })?;

        Ok(Box::new(DummyStreamHandle {
            stop,
            done_rx,
            thread: Some(thread),
        }))
    }
}

struct DummyStreamHandle {
    stop: Arc<AtomicBool>,
    done_rx: Receiver<()>,
    thread: Option<JoinHandle<()>>,
}

impl StreamHandle for DummyStreamHandle {
    fn is_active(&self) -> bool {
        self.thread.is_some()
    }

    fn stop(&mut self) -> Result<()> {
        let Some(thread) = self.thread.take() else {
            return Ok(());
        };
        self.stop.store(true, Ordering::Release);
        match self.done_rx.recv_timeout(TEARDOWN_TIMEOUT) {
            Ok(()) => {
                let _ = thread.join();
                Ok(())
            }
            // The thread is wedged inside a callback. Leave it detached; the
            // device stays busy until it actually exits.
            Err(_) => Err(AudioIoError::StreamTeardownTimeout),
        }
    }
}

impl Drop for DummyStreamHandle {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn desc(device_index: usize, sample_rate: u32, block_size: usize) -> StreamDesc {
        StreamDesc {
            device_index,
            sample_rate,
            block_size,
            output: None,
            input: None,
        }
    }

    #[test]
    fn test_device_listing() {
        let backend = DummyBackend::new();
        let devices = backend.devices().unwrap();
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].index, 0);
        assert_eq!(devices[0].name, "Dummy Stereo");
        assert_eq!(devices[0].channels, 2);
        assert_eq!(devices[1].channels, 16);
    }

    #[test]
    fn test_legal_sets() {
        let backend = DummyBackend::new();
        assert!(backend.sample_rates(0).unwrap().contains(&44100));
        assert!(backend.block_sizes(0).unwrap().contains(&256));
        assert!(matches!(
            backend.sample_rates(7),
            Err(AudioIoError::UnknownDevice(7))
        ));
    }

    #[test]
    fn test_fixed_device_reports_empty_sets() {
        let backend = DummyBackend::with_devices(vec![DummyDevice::fixed()]);
        assert!(backend.sample_rates(0).unwrap().is_empty());
        assert!(backend.block_sizes(0).unwrap().is_empty());
    }

    #[test]
    fn test_open_invokes_callback() {
        let mut backend = DummyBackend::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let cb_calls = Arc::clone(&calls);

        let mut d = desc(0, 48000, 64);
        d.output = Some(Box::new(move |req: OutputRequest<'_>| {
            assert_eq!(req.channels, 2);
            assert_eq!(req.samples.len(), 64 * 2);
            cb_calls.fetch_add(1, Ordering::Relaxed);
        }));

        let mut handle = backend.open_stream(d).unwrap();
        assert!(handle.is_active());
        thread::sleep(Duration::from_millis(20));
        handle.stop().unwrap();
        assert!(!handle.is_active());
        assert!(calls.load(Ordering::Relaxed) > 0);

        // No callbacks after stop has returned.
        let after = calls.load(Ordering::Relaxed);
        thread::sleep(Duration::from_millis(10));
        assert_eq!(calls.load(Ordering::Relaxed), after);
    }

    #[test]
    fn test_busy_device_rejects_second_stream() {
        let mut backend = DummyBackend::new();
        let mut first = backend.open_stream(desc(0, 48000, 64)).unwrap();
        let second = backend.open_stream(desc(0, 48000, 64));
        assert!(matches!(second, Err(AudioIoError::DeviceOpenFailed(_))));

        first.stop().unwrap();
        let mut third = backend.open_stream(desc(0, 48000, 64)).unwrap();
        third.stop().unwrap();
    }

    #[test]
    fn test_independent_devices_stream_concurrently() {
        let mut backend = DummyBackend::new();
        let mut a = backend.open_stream(desc(0, 48000, 64)).unwrap();
        let mut b = backend.open_stream(desc(1, 48000, 64)).unwrap();
        a.stop().unwrap();
        b.stop().unwrap();
    }

    #[test]
    fn test_unsupported_rate_rejected() {
        let mut backend = DummyBackend::new();
        let result = backend.open_stream(desc(0, 12345, 64));
        assert!(matches!(result, Err(AudioIoError::DeviceOpenFailed(_))));
        // The rejection must not leave the device marked busy.
        let mut handle = backend.open_stream(desc(0, 48000, 64)).unwrap();
        handle.stop().unwrap();
    }

    #[test]
    fn test_fixed_device_accepts_any_rate() {
        let mut backend = DummyBackend::with_devices(vec![DummyDevice::fixed()]);
        let mut handle = backend.open_stream(desc(0, 12345, 64)).unwrap();
        handle.stop().unwrap();
    }

    #[test]
    fn test_stop_is_idempotent() {
        let mut backend = DummyBackend::new();
        let mut handle = backend.open_stream(desc(0, 48000, 64)).unwrap();
        handle.stop().unwrap();
        handle.stop().unwrap();
    }

    #[test]
    fn test_wedged_callback_times_out_and_keeps_device_busy() {
        let mut backend = DummyBackend::new();
        let mut d = desc(0, 48000, 64);
        let wedged = Arc::new(AtomicBool::new(false));
        let cb_wedged = Arc::clone(&wedged);
        d.output = Some(Box::new(move |_req: OutputRequest<'_>| {
            if !cb_wedged.swap(true, Ordering::AcqRel) {
                thread::sleep(Duration::from_millis(1500));
            }
        }));

        let mut handle = backend.open_stream(d).unwrap();
        thread::sleep(Duration::from_millis(10));
        assert!(matches!(
            handle.stop(),
            Err(AudioIoError::StreamTeardownTimeout)
        ));

        // Still wedged: the device must refuse a new stream.
        assert!(matches!(
            backend.open_stream(desc(0, 48000, 64)),
            Err(AudioIoError::DeviceOpenFailed(_))
        ));

        // Once the thread actually exits the device frees up.
        thread::sleep(Duration::from_millis(1600));
        let mut reopened = backend.open_stream(desc(0, 48000, 64)).unwrap();
        reopened.stop().unwrap();
    }
}
