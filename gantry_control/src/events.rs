//! Listener traits and the event hub.
//!
//! Callbacks run on the thread that produced the event (listener, worker
//! or caller) with no engine lock held, so they may call back into the
//! [`Orchestrator`](crate::Orchestrator). They should return quickly.

use crate::work::WorkType;
use gantry_common::device::Device;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Device state observer.
pub trait DeviceListener: Send + Sync {
    /// A device's observable state changed.
    fn device_updated(&self, _device: &Device) {}

    /// The device list was rebuilt (project opened, reconnect).
    fn device_list_changed(&self, _devices: &[Device]) {}
}

/// Job progress observer.
pub trait JobListener: Send + Sync {
    /// Every device idle and no job active.
    fn machine_idle(&self) {}

    /// The remaining batch changed.
    fn action_list_changed(&self, _remaining: usize) {}

    fn pose_set_started(&self, _index: usize) {}

    fn pose_set_imaged(&self, _index: usize) {}

    fn job_finished(&self, _kind: WorkType) {}

    /// The job was stopped by a fault. Fired once per job.
    fn job_faulted(&self, _kind: WorkType, _reason: &str) {}
}

/// Fan-out of engine events to registered listeners.
#[derive(Default)]
pub struct EventHub {
    devices: RwLock<Vec<Arc<dyn DeviceListener>>>,
    jobs: RwLock<Vec<Arc<dyn JobListener>>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_device_listener(&self, listener: Arc<dyn DeviceListener>) {
        self.devices.write().push(listener);
    }

    pub fn register_job_listener(&self, listener: Arc<dyn JobListener>) {
        self.jobs.write().push(listener);
    }

    // Snapshots keep registration possible from inside a callback.
    fn device_listeners(&self) -> Vec<Arc<dyn DeviceListener>> {
        self.devices.read().clone()
    }

    fn job_listeners(&self) -> Vec<Arc<dyn JobListener>> {
        self.jobs.read().clone()
    }

    pub(crate) fn device_updated(&self, device: &Device) {
        for l in self.device_listeners() {
            l.device_updated(device);
        }
    }

    pub(crate) fn device_list_changed(&self, devices: &[Device]) {
        for l in self.device_listeners() {
            l.device_list_changed(devices);
        }
    }

    pub(crate) fn machine_idle(&self) {
        for l in self.job_listeners() {
            l.machine_idle();
        }
    }

    pub(crate) fn action_list_changed(&self, remaining: usize) {
        for l in self.job_listeners() {
            l.action_list_changed(remaining);
        }
    }

    pub(crate) fn pose_set_started(&self, index: usize) {
        for l in self.job_listeners() {
            l.pose_set_started(index);
        }
    }

    pub(crate) fn pose_set_imaged(&self, index: usize) {
        for l in self.job_listeners() {
            l.pose_set_imaged(index);
        }
    }

    pub(crate) fn job_finished(&self, kind: WorkType) {
        for l in self.job_listeners() {
            l.job_finished(kind);
        }
    }

    pub(crate) fn job_faulted(&self, kind: WorkType, reason: &str) {
        for l in self.job_listeners() {
            l.job_faulted(kind, reason);
        }
    }
}

/// Logs every event. Used by the `gantry` binary.
pub struct TracingListener;

impl DeviceListener for TracingListener {
    fn device_updated(&self, device: &Device) {
        debug!("Device {} is {}", device.id, device.status());
    }

    fn device_list_changed(&self, devices: &[Device]) {
        let ids: Vec<u32> = devices.iter().map(|d| d.id).collect();
        info!("Devices: {:?}", ids);
    }
}

impl JobListener for TracingListener {
    fn machine_idle(&self) {
        info!("Machine idle");
    }

    fn action_list_changed(&self, remaining: usize) {
        debug!("{} packets remaining", remaining);
    }

    fn pose_set_started(&self, index: usize) {
        info!("Pose set {} started", index);
    }

    fn pose_set_imaged(&self, index: usize) {
        info!("Pose set {} imaged", index);
    }

    fn job_finished(&self, kind: WorkType) {
        info!("{} job finished", kind);
    }

    fn job_faulted(&self, kind: WorkType, reason: &str) {
        error!("{} job stopped: {}", kind, reason);
    }
}
