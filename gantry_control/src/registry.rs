//! Device registry.
//!
//! One mutex guards the device map and is held only for the duration of a
//! single update. Change notifications go out after the lock is released.

use crate::events::EventHub;
use gantry_common::device::Device;
use gantry_common::protocol::SerialResponse;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

/// All devices of the open project.
pub struct DeviceRegistry {
    devices: Mutex<BTreeMap<u32, Device>>,
    events: Arc<EventHub>,
}

impl DeviceRegistry {
    pub fn new(events: Arc<EventHub>) -> Self {
        Self {
            devices: Mutex::new(BTreeMap::new()),
            events,
        }
    }

    /// Replace the device list, reconciling devices that were homed and
    /// had reported on the previous list.
    pub fn rebuild(&self, ids: &[u32]) {
        let snapshot = {
            let mut devices = self.devices.lock();
            let rebuilt: BTreeMap<u32, Device> = ids
                .iter()
                .filter(|&&id| id != 0)
                .map(|&id| {
                    let mut device = Device::new(id);
                    if let Some(previous) = devices.get(&id) {
                        device.reconcile_from(previous);
                    }
                    (id, device)
                })
                .collect();
            *devices = rebuilt;
            devices.values().cloned().collect::<Vec<_>>()
        };
        self.events.device_list_changed(&snapshot);
    }

    pub fn ids(&self) -> Vec<u32> {
        self.devices.lock().keys().copied().collect()
    }

    pub fn snapshot(&self) -> Vec<Device> {
        self.devices.lock().values().cloned().collect()
    }

    pub fn device(&self, id: u32) -> Option<Device> {
        self.devices.lock().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.devices.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.lock().is_empty()
    }

    /// Expand an address: `0` means every device, unknown ids resolve to
    /// nothing.
    pub fn resolve(&self, address: u32) -> Vec<u32> {
        let devices = self.devices.lock();
        if address == 0 {
            devices.keys().copied().collect()
        } else if devices.contains_key(&address) {
            vec![address]
        } else {
            Vec::new()
        }
    }

    /// Record a report. Returns `None` for unknown devices, otherwise
    /// whether the device changed.
    pub fn apply_response(&self, response: SerialResponse) -> Option<bool> {
        let updated = {
            let mut devices = self.devices.lock();
            let device = devices.get_mut(&response.device_id)?;
            device
                .apply_response(response, Instant::now())
                .then(|| device.clone())
        };
        let changed = updated.is_some();
        if let Some(device) = updated {
            self.events.device_updated(&device);
        }
        Some(changed)
    }

    fn update(&self, ids: &[u32], f: impl Fn(&mut Device) -> bool) -> Vec<Device> {
        let mut devices = self.devices.lock();
        let mut changed = Vec::new();
        for id in ids {
            if let Some(device) = devices.get_mut(id) {
                if f(device) {
                    changed.push(device.clone());
                }
            }
        }
        changed
    }

    /// Fire `device_updated` for devices changed by a deferred update.
    pub fn notify(&self, changed: &[Device]) {
        for device in changed {
            self.events.device_updated(device);
        }
    }

    /// Set the serial writing flag without notifying. Pair with [`notify`].
    ///
    /// [`notify`]: Self::notify
    pub fn mark_writing_serial(&self, ids: &[u32], writing: bool) -> Vec<Device> {
        self.update(ids, |d| {
            let changed = d.is_writing_serial != writing;
            d.is_writing_serial = writing;
            changed
        })
    }

    pub fn set_writing_camera(&self, ids: &[u32], writing: bool) {
        let changed = self.update(ids, |d| {
            let changed = d.is_writing_camera != writing;
            d.is_writing_camera = writing;
            changed
        });
        self.notify(&changed);
    }

    /// Mark devices homed without notifying. Pair with [`notify`].
    ///
    /// [`notify`]: Self::notify
    pub fn mark_homed(&self, ids: &[u32]) -> Vec<Device> {
        self.update(ids, |d| !std::mem::replace(&mut d.is_homed, true))
    }

    /// Record the coordinate mode confirmed by a `G90`/`G91` write.
    pub fn set_absolute(&self, ids: &[u32], absolute: bool) {
        self.update(ids, |d| {
            d.is_absolute = absolute;
            false
        });
    }

    /// Clear both writing flags on every device.
    pub fn clear_writing(&self) {
        let ids = self.ids();
        let changed = self.update(&ids, |d| {
            let changed = d.is_writing_serial || d.is_writing_camera;
            d.is_writing_serial = false;
            d.is_writing_camera = false;
            changed
        });
        self.notify(&changed);
    }

    /// Every device reports idle.
    pub fn all_idle(&self) -> bool {
        self.devices.lock().values().all(Device::is_idle)
    }

    pub fn any_locked(&self) -> bool {
        self.devices.lock().values().any(Device::is_locked)
    }

    pub fn any_faulted(&self) -> bool {
        self.devices.lock().values().any(Device::is_faulted)
    }

    /// Devices among `ids` that are not homed.
    pub fn unhomed(&self, ids: &[u32]) -> Vec<u32> {
        let devices = self.devices.lock();
        ids.iter()
            .copied()
            .filter(|id| devices.get(id).is_some_and(|d| !d.is_homed))
            .collect()
    }

    /// Devices with no report since `since`.
    pub fn unreported_since(&self, since: Instant) -> Vec<u32> {
        self.devices
            .lock()
            .values()
            .filter(|d| d.last_reported_on.is_none_or(|t| t < since))
            .map(|d| d.id)
            .collect()
    }
}
