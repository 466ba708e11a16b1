//! Registry of known devices, keyed by hardware identifier.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use tokio::time::Instant;

use crate::color::{LightColor, LightPower};

/// Last observed state of one device.
///
/// The hardware identifier is stable; the network address may change
/// across device restarts, in which case the device must be re-discovered.
#[derive(Debug, Clone)]
pub struct DeviceState {
    /// Hardware identifier (MAC in the low 6 bytes)
    pub target: u64,
    /// Address the device last responded from
    pub addr: SocketAddr,
    /// Last-known label, if one was ever fetched
    pub label: Option<String>,
    /// Last-known power state
    pub power: Option<LightPower>,
    /// Last-known color state
    pub color: Option<LightColor>,
    /// When the device last answered anything
    pub last_seen: Instant,
}

/// Shared per-device record: the observed state plus the cancel flag of
/// the fade currently running on the device. Every handle for the same
/// hardware identifier points at the same entry, however it was obtained,
/// so an overlapping fade cancels the running one device-wide.
pub(crate) struct DeviceEntry {
    pub(crate) state: Mutex<DeviceState>,
    pub(crate) running_fade: Mutex<Option<Arc<AtomicBool>>>,
}

/// Holds one entry per discovered device.
///
/// Entries are created on first discovery, updated on every successful
/// response, and never expired by the core.
#[derive(Default)]
pub(crate) struct Registry {
    devices: Mutex<BTreeMap<u64, Arc<DeviceEntry>>>,
}

impl Registry {
    /// Insert or refresh a device entry, returning the shared record
    pub(crate) fn upsert(&self, target: u64, addr: SocketAddr) -> Arc<DeviceEntry> {
        let mut devices = self.devices.lock().unwrap();
        match devices.get(&target) {
            Some(entry) => {
                let mut state = entry.state.lock().unwrap();
                state.addr = addr;
                state.last_seen = Instant::now();
                drop(state);
                entry.clone()
            }
            None => {
                let entry = Arc::new(DeviceEntry {
                    state: Mutex::new(DeviceState {
                        target,
                        addr,
                        label: None,
                        power: None,
                        color: None,
                        last_seen: Instant::now(),
                    }),
                    running_fade: Mutex::new(None),
                });
                devices.insert(target, entry.clone());
                entry
            }
        }
    }

    /// Look up a device by hardware identifier
    pub(crate) fn get(&self, target: u64) -> Option<Arc<DeviceEntry>> {
        self.devices.lock().unwrap().get(&target).cloned()
    }

    /// Shared records of every known device
    pub(crate) fn entries(&self) -> Vec<Arc<DeviceEntry>> {
        self.devices.lock().unwrap().values().cloned().collect()
    }

    /// Snapshot of every known device's state
    pub(crate) fn snapshot(&self) -> Vec<DeviceState> {
        self.devices
            .lock()
            .unwrap()
            .values()
            .map(|entry| entry.state.lock().unwrap().clone())
            .collect()
    }
}
