//! Driver layer
//!
//! Unified access to heterogeneous native audio backends: driver
//! enumeration, per-driver device enumeration, and stream opening with
//! real-time callbacks.

pub mod backend;
pub mod cpal_backend;
pub mod device;
pub mod dummy;
pub mod registry;

pub use backend::{
    DriverBackend, InputCallback, InputCapture, OutputCallback, OutputRequest, StreamDesc,
    StreamHandle,
};
pub use cpal_backend::CpalBackend;
pub use device::{DeviceInfo, MAX_CHANNELS, MAX_TOTAL_CHANNELS};
pub use dummy::{DummyBackend, DummyDevice};
pub use registry::{DriverHandle, DriverId, DriverInfo, DriverRegistry};
