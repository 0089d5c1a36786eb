//! Driver registry.
//!
//! Enumerates the backend drivers reachable from this process and opens
//! connections to them. Probing is a pure query; no audio starts until a
//! stream is opened through a driver handle.

use crate::driver::backend::DriverBackend;
use crate::driver::cpal_backend::CpalBackend;
use crate::driver::dummy::{DummyBackend, DummyDevice};
use crate::error::{AudioIoError, Result};

/// Identifier for a registered driver. Stable for the registry's lifetime.
pub type DriverId = i32;

/// An open connection to a backend driver.
pub type DriverHandle = Box<dyn DriverBackend>;

/// A driver as presented to callers: identifier plus display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverInfo {
    pub id: DriverId,
    pub name: String,
}

enum DriverKind {
    Cpal(cpal::HostId),
    Dummy(Vec<DummyDevice>),
}

/// The set of drivers available to this process.
pub struct DriverRegistry {
    entries: Vec<(DriverInfo, DriverKind)>,
}

impl DriverRegistry {
    /// Probe the OS for available backends.
    ///
    /// Each available cpal host becomes one driver; the dummy driver is
    /// always listed last.
    pub fn probe() -> Self {
        let mut entries: Vec<(DriverInfo, DriverKind)> = Vec::new();
        for host_id in cpal::available_hosts() {
            let id = entries.len() as DriverId;
            entries.push((
                DriverInfo {
                    id,
                    name: host_id.name().to_string(),
                },
                DriverKind::Cpal(host_id),
            ));
        }
        let id = entries.len() as DriverId;
        entries.push((
            DriverInfo {
                id,
                name: "Dummy".to_string(),
            },
            DriverKind::Dummy(vec![DummyDevice::stereo(), DummyDevice::multichannel()]),
        ));
        Self { entries }
    }

    /// Registry exposing only the dummy driver with the given virtual
    /// devices. For headless rigs and tests.
    pub fn dummy(devices: Vec<DummyDevice>) -> Self {
        Self {
            entries: vec![(
                DriverInfo {
                    id: 0,
                    name: "Dummy".to_string(),
                },
                DriverKind::Dummy(devices),
            )],
        }
    }

    /// All registered drivers, in presentation order.
    pub fn drivers(&self) -> Vec<DriverInfo> {
        self.entries.iter().map(|(info, _)| info.clone()).collect()
    }

    /// Display name of a driver.
    pub fn driver_name(&self, id: DriverId) -> Option<&str> {
        self.entries
            .iter()
            .find(|(info, _)| info.id == id)
            .map(|(info, _)| info.name.as_str())
    }

    /// The driver selected when nothing else has been chosen yet.
    pub fn default_driver(&self) -> DriverId {
        // The registry always holds at least the dummy driver.
        self.entries[0].0.id
    }

    /// Open a connection to a driver.
    pub fn open(&self, id: DriverId) -> Result<DriverHandle> {
        let (_, kind) = self
            .entries
            .iter()
            .find(|(info, _)| info.id == id)
            .ok_or(AudioIoError::UnknownDriver(id))?;
        match kind {
            DriverKind::Cpal(host_id) => {
                let host = cpal::host_from_id(*host_id).map_err(|e| {
                    AudioIoError::DriverUnavailable {
                        driver: id,
                        reason: e.to_string(),
                    }
                })?;
                Ok(Box::new(CpalBackend::new(id, host)))
            }
            DriverKind::Dummy(devices) => Ok(Box::new(DummyBackend::with_devices(devices.clone()))),
        }
    }
}
