//! Backend driver abstraction.
//!
//! One implementation per native audio API. A backend enumerates devices,
//! reports their legal sample rates and block sizes, and opens streams that
//! invoke caller-supplied callbacks on the backend's real-time thread.

use crate::driver::device::DeviceInfo;
use crate::error::Result;

/// A block of interleaved output samples requested by the real-time thread.
///
/// `samples` covers one block for the device's full channel count. The
/// callback is responsible for every sample in the buffer; backends do not
/// clear it.
pub struct OutputRequest<'a> {
    pub samples: &'a mut [f32],
    /// Interleaved channel count of `samples`.
    pub channels: usize,
}

/// A block of interleaved input samples captured by the real-time thread.
pub struct InputCapture<'a> {
    pub samples: &'a [f32],
    /// Interleaved channel count of `samples`.
    pub channels: usize,
}

/// Called on the real-time thread to fill one output block.
pub type OutputCallback = Box<dyn FnMut(OutputRequest<'_>) + Send>;

/// Called on the real-time thread with one captured input block.
pub type InputCallback = Box<dyn FnMut(InputCapture<'_>) + Send>;

/// Everything a backend needs to open one stream.
///
/// Either endpoint may be absent; a backend opens only the directions it is
/// given. Callbacks must be real-time safe: they are invoked on the
/// backend's audio thread on a strict, device-driven cadence.
pub struct StreamDesc {
    pub device_index: usize,
    pub sample_rate: u32,
    pub block_size: usize,
    pub output: Option<OutputCallback>,
    pub input: Option<InputCallback>,
}

/// An open stream owned by the control thread.
///
/// Dropping a handle stops the stream best-effort; call [`StreamHandle::stop`]
/// to observe teardown errors. After `stop` returns `Ok`, the real-time
/// callback is guaranteed not to run again.
pub trait StreamHandle {
    /// Whether the real-time callback is still scheduled.
    fn is_active(&self) -> bool;

    /// Stop the stream and quiesce the real-time callback.
    ///
    /// Must complete deterministically; implementations bound the worst case
    /// and surface `StreamTeardownTimeout` if the driver wedges.
    fn stop(&mut self) -> Result<()>;
}

/// A connection to one backend audio API.
///
/// Device enumeration is re-run on every call; device sets change between
/// calls (hot-plug), so results are never cached here.
pub trait DriverBackend {
    /// Human-readable driver name.
    fn name(&self) -> &str;

    /// Current device list, in the backend's order.
    fn devices(&self) -> Result<Vec<DeviceInfo>>;

    /// Legal sample rates for a device. Empty means the device dictates a
    /// single fixed rate ("locked by device").
    fn sample_rates(&self, device_index: usize) -> Result<Vec<u32>>;

    /// Legal block sizes for a device. Empty means locked by device.
    fn block_sizes(&self, device_index: usize) -> Result<Vec<usize>>;

    /// Open a stream on a device.
    ///
    /// At most one stream per device may be active; a busy device fails
    /// with `DeviceOpenFailed`.
    fn open_stream(&mut self, desc: StreamDesc) -> Result<Box<dyn StreamHandle>>;
}
