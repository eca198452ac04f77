//! Work orchestrator.
//!
//! Owns the job state machine, the batch and the worker thread, and starts
//! one [`Listener`] per connection. All operations are callable from any
//! thread, including from event callbacks running on the worker.
//!
//! Lock order: lifecycle → worker/listener handles; clear-to-send →
//! registry → port writer; state → registry. Events fire with no lock
//! held.

mod worker;

pub use worker::WorkerStats;

use crate::error::EngineError;
use crate::events::EventHub;
use crate::handshake::ClearToSend;
use crate::host::Host;
use crate::listener::Listener;
use crate::project::Project;
use crate::registry::DeviceRegistry;
use crate::work::{
    BatchBuilder, JobControl, Packet, TransitionResult, WorkEvent, WorkPhase, WorkStateMachine,
    WorkType,
};
use gantry_common::config::{EngineConfig, GantryConfig};
use gantry_common::protocol::{Action, Destination, serialize_all};
use gantry_hal::PortManager;
use parking_lot::{Mutex, ReentrantMutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use worker::Notice;

// ─── Shared state ───────────────────────────────────────────────────

/// Job bookkeeping guarded by one mutex.
#[derive(Debug, Default)]
pub(crate) struct WorkState {
    pub(crate) machine: WorkStateMachine,
    pub(crate) project: Project,
    pub(crate) batch: VecDeque<Packet>,
    pub(crate) offsets: Option<(usize, usize)>,
    /// Jog packets that pre-empt the batch at packet boundaries.
    pub(crate) side_queue: VecDeque<Packet>,
    /// Unsent runs of the packet in flight.
    pub(crate) partial: VecDeque<crate::work::Run>,
    pub(crate) current_pose_set: Option<usize>,
    pub(crate) imaged_pose_sets: Vec<usize>,
    pub(crate) pre_shutter_done: bool,
    pub(crate) post_shutter_armed: bool,
    /// Devices marked homed when a homing job finishes.
    pub(crate) homing_devices: Vec<u32>,
    /// Devices with an open activity record.
    pub(crate) open_records: Vec<u32>,
}

impl WorkState {
    /// Drop every trace of the current job. Returns devices whose activity
    /// record is still open.
    pub(crate) fn clear_job(&mut self) -> Vec<u32> {
        self.batch.clear();
        self.offsets = None;
        self.side_queue.clear();
        self.partial.clear();
        self.current_pose_set = None;
        self.imaged_pose_sets.clear();
        self.pre_shutter_done = false;
        self.post_shutter_armed = false;
        self.homing_devices.clear();
        std::mem::take(&mut self.open_records)
    }
}

/// State shared by the caller, the worker and the listener.
pub(crate) struct Shared {
    pub(crate) engine: EngineConfig,
    pub(crate) ports: Arc<PortManager>,
    pub(crate) registry: DeviceRegistry,
    pub(crate) events: Arc<EventHub>,
    pub(crate) cts: ClearToSend,
    pub(crate) control: JobControl,
    pub(crate) state: Mutex<WorkState>,
    pub(crate) host: Host,
    pub(crate) stats: Mutex<WorkerStats>,
}

impl Shared {
    /// Write outside the handshake. Writing flags are not touched.
    pub(crate) fn send_raw(&self, actions: &[Action]) -> bool {
        let payload = serialize_all(actions);
        if payload.is_empty() {
            return true;
        }
        self.ports.write(&payload)
    }

    pub(crate) fn query_devices(&self, ids: &[u32]) -> bool {
        let actions: Vec<Action> = ids.iter().map(|&id| Action::query(id)).collect();
        self.send_raw(&actions)
    }

    pub(crate) fn unlock_devices(&self, ids: &[u32]) -> bool {
        let actions: Vec<Action> = ids.iter().map(|&id| Action::unlock(id)).collect();
        self.send_raw(&actions)
    }

    pub(crate) fn job_active(&self) -> bool {
        self.state.lock().machine.is_active()
    }

    /// Expand the addresses of `actions` to registered device ids.
    pub(crate) fn resolve_all(&self, actions: &[Action]) -> Vec<u32> {
        let mut ids = Vec::new();
        for action in actions {
            for id in self.registry.resolve(action.device()) {
                if !ids.contains(&id) {
                    ids.push(id);
                }
            }
        }
        ids
    }
}

// ─── Orchestrator ───────────────────────────────────────────────────

/// Public engine API.
pub struct Orchestrator {
    shared: Arc<Shared>,
    /// Serializes connect, disconnect and port selection.
    lifecycle: ReentrantMutex<()>,
    worker: Mutex<Option<JoinHandle<()>>>,
    listener: Mutex<Option<Listener>>,
}

impl Orchestrator {
    pub fn new(config: &GantryConfig, ports: Arc<PortManager>, host: Host) -> Self {
        Self::with_engine(config.engine.clone(), ports, host)
    }

    pub fn with_engine(engine: EngineConfig, ports: Arc<PortManager>, host: Host) -> Self {
        let events = Arc::new(EventHub::new());
        let shared = Shared {
            engine,
            ports,
            registry: DeviceRegistry::new(events.clone()),
            events,
            cts: ClearToSend::new(),
            control: JobControl::new(),
            state: Mutex::new(WorkState::default()),
            host,
            stats: Mutex::new(WorkerStats::default()),
        };
        Self {
            shared: Arc::new(shared),
            lifecycle: ReentrantMutex::new(()),
            worker: Mutex::new(None),
            listener: Mutex::new(None),
        }
    }

    #[inline]
    pub fn events(&self) -> &Arc<EventHub> {
        &self.shared.events
    }

    #[inline]
    pub fn registry(&self) -> &DeviceRegistry {
        &self.shared.registry
    }

    #[inline]
    pub fn ports(&self) -> &Arc<PortManager> {
        &self.shared.ports
    }

    // ── Project and connection ──

    /// Install a project and rebuild the device list.
    pub fn open_project(&self, project: Project) -> Result<(), EngineError> {
        let ids = {
            let mut state = self.shared.state.lock();
            if state.machine.is_active() {
                return Err(EngineError::Busy);
            }
            state.project = project;
            state.project.devices.clone()
        };
        self.shared.registry.rebuild(&ids);
        info!("Opened project with devices {:?}", self.shared.registry.ids());

        if self.is_connected() && !self.shared.registry.is_empty() {
            self.shared.query_devices(&self.shared.registry.ids());
        }
        Ok(())
    }

    pub fn project(&self) -> Project {
        self.shared.state.lock().project.clone()
    }

    /// Bind a port. Switching ports while connected disconnects first.
    pub fn select_port(&self, name: &str) -> Result<(), EngineError> {
        let _lifecycle = self.lifecycle.lock();
        if self.shared.ports.selected().as_deref() == Some(name) {
            return Ok(());
        }
        // Unknown names fail before the live link is touched.
        self.shared.ports.resolve(name)?;
        if self.is_connected() {
            self.disconnect();
        }
        self.shared.ports.select(name)?;
        Ok(())
    }

    /// Open the selected port and start the listener. No-op when connected.
    pub fn connect(&self) -> Result<(), EngineError> {
        let _lifecycle = self.lifecycle.lock();
        if self.is_connected() {
            debug!("Already connected");
            return Ok(());
        }
        // A listener left over from a broken link.
        self.stop_listener();

        self.shared.ports.open_default()?;
        self.shared.cts.revoke();
        let ids = self.shared.state.lock().project.devices.clone();
        self.shared.registry.rebuild(&ids);

        match Listener::spawn(self.shared.clone()) {
            Ok(listener) => {
                *self.listener.lock() = Some(listener);
                info!("Connected");
                Ok(())
            }
            Err(e) => {
                self.shared.ports.close();
                Err(e)
            }
        }
    }

    /// Stop any job, the listener and the port.
    pub fn disconnect(&self) {
        let _lifecycle = self.lifecycle.lock();
        self.abandon_job();
        self.stop_listener();
        self.shared.ports.close();
        self.shared.cts.revoke();
        self.shared.registry.clear_writing();
        info!("Disconnected");
    }

    pub fn is_connected(&self) -> bool {
        self.listener.lock().is_some() && self.shared.ports.is_open()
    }

    fn stop_listener(&self) {
        let listener = self.listener.lock().take();
        if let Some(mut listener) = listener {
            listener.stop();
        }
    }

    // ── Jobs ──

    pub fn start_imaging(&self) -> Result<(), EngineError> {
        self.start(WorkType::Imaging, &[])
    }

    pub fn start_homing(&self) -> Result<(), EngineError> {
        self.start(WorkType::Homing, &[])
    }

    pub fn start_set_ready(&self) -> Result<(), EngineError> {
        self.start(WorkType::SetReady, &[])
    }

    pub fn start_jogging(&self, actions: &[Action]) -> Result<(), EngineError> {
        self.start(WorkType::Jogging, actions)
    }

    /// Jog within the running jogging job, or start one.
    pub fn jog(&self, actions: &[Action]) -> Result<(), EngineError> {
        let actions: Vec<Action> = actions.iter().filter(|a| !a.is_none()).cloned().collect();
        if actions.is_empty() {
            return Err(EngineError::EmptyBatch(WorkType::Jogging));
        }
        {
            let mut state = self.shared.state.lock();
            if state.machine.work_type() == Some(WorkType::Jogging) {
                let unhomed = self
                    .shared
                    .registry
                    .unhomed(&self.shared.resolve_all(&actions));
                if !unhomed.is_empty() {
                    return Err(EngineError::NotHomed(unhomed));
                }
                state.side_queue.push_back(Packet::new(actions));
                debug!("Queued jog packet, {} waiting", state.side_queue.len());
                return Ok(());
            }
        }
        self.start(WorkType::Jogging, &actions)
    }

    fn start(&self, kind: WorkType, jog: &[Action]) -> Result<(), EngineError> {
        if self.shared.job_active() {
            return Err(EngineError::Busy);
        }
        if !self.is_connected() {
            return Err(EngineError::NotConnected);
        }

        let remaining = {
            let mut state = self.shared.state.lock();
            if state.machine.is_active() {
                return Err(EngineError::Busy);
            }
            let devices = self.shared.registry.snapshot();
            let batch = BatchBuilder::new(&devices).build(kind, &state.project, jog);
            if batch.body_len() == 0 {
                return Err(EngineError::EmptyBatch(kind));
            }

            let addressed: Vec<u32> = batch
                .body_addresses()
                .into_iter()
                .flat_map(|address| self.shared.registry.resolve(address))
                .collect();
            if kind.requires_homed() {
                let unhomed = self.shared.registry.unhomed(&addressed);
                if !unhomed.is_empty() {
                    return Err(EngineError::NotHomed(unhomed));
                }
            }

            state.clear_job();
            state.offsets = batch.offsets;
            state.batch = batch.packets.into();
            if kind == WorkType::Homing {
                state.homing_devices = addressed;
            }
            state.machine.handle_event(WorkEvent::Start(kind));
            self.shared.control.arm_new_job();
            state.batch.len()
        };

        self.shared.events.action_list_changed(remaining);
        if let Err(e) = self.spawn_worker() {
            self.shared.control.stop();
            let mut state = self.shared.state.lock();
            state.machine.handle_event(WorkEvent::Fault);
            state.clear_job();
            return Err(e);
        }
        info!("Started {} job with {} packets", kind, remaining);
        Ok(())
    }

    /// Send right away, bypassing the batch and the handshake.
    pub fn send_immediate(&self, actions: &[Action]) -> Result<(), EngineError> {
        if !self.is_connected() {
            return Err(EngineError::NotConnected);
        }
        let actions: Vec<Action> = actions.iter().filter(|a| !a.is_none()).cloned().collect();
        for run in Packet::new(actions).runs() {
            match run.destination {
                Destination::Serial => {
                    if !self.shared.send_raw(&run.actions) {
                        return Err(EngineError::WriteFailed(run.payload()));
                    }
                }
                Destination::Camera => {
                    for action in &run.actions {
                        for device in self.shared.registry.resolve(action.device()) {
                            self.shared.host.dispatch_camera(action, device);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Ask every device for a status report.
    pub fn query_status(&self) -> Result<(), EngineError> {
        self.immediate(|ids| self.shared.query_devices(ids), "status query")
    }

    /// Release the lock on every device.
    pub fn unlock(&self) -> Result<(), EngineError> {
        self.immediate(|ids| self.shared.unlock_devices(ids), "unlock")
    }

    fn immediate(&self, send: impl FnOnce(&[u32]) -> bool, what: &str) -> Result<(), EngineError> {
        if !self.is_connected() {
            return Err(EngineError::NotConnected);
        }
        let ids = self.shared.registry.ids();
        if send(&ids) {
            Ok(())
        } else {
            Err(EngineError::WriteFailed(what.to_string()))
        }
    }

    pub fn pause(&self) -> Result<(), EngineError> {
        {
            let mut state = self.shared.state.lock();
            if let TransitionResult::Rejected(reason) = state.machine.handle_event(WorkEvent::Pause) {
                debug!("Pause rejected: {}", reason);
                return Err(EngineError::NotRunning);
            }
            self.shared.control.pause();
        }
        self.join_worker();
        info!("Job paused, {} packets remain", self.shared.state.lock().batch.len());
        Ok(())
    }

    pub fn resume(&self) -> Result<(), EngineError> {
        if !self.is_connected() {
            return Err(EngineError::NotConnected);
        }
        {
            let mut state = self.shared.state.lock();
            if let TransitionResult::Rejected(reason) = state.machine.handle_event(WorkEvent::Resume) {
                debug!("Resume rejected: {}", reason);
                return Err(EngineError::NotPaused);
            }
            self.shared.control.arm();
        }
        if let Err(e) = self.spawn_worker() {
            self.shared.control.pause();
            self.shared.state.lock().machine.handle_event(WorkEvent::Pause);
            return Err(e);
        }
        info!("Job resumed");
        Ok(())
    }

    /// Stop and discard the job, then ask the rig where it is.
    pub fn cancel(&self) {
        if self.abandon_job() {
            info!("Job cancelled");
            if self.is_connected() && !self.shared.query_devices(&self.shared.registry.ids()) {
                warn!("Status query after cancel failed");
            }
        }
    }

    /// Returns whether a job was active.
    fn abandon_job(&self) -> bool {
        self.shared.control.stop();
        self.join_worker();

        let (was_active, open) = {
            let mut state = self.shared.state.lock();
            let was_active = state.machine.is_active();
            if was_active {
                state.machine.handle_event(WorkEvent::Cancel);
            }
            (was_active, state.clear_job())
        };
        self.shared.registry.clear_writing();

        if was_active {
            let notices: Vec<Notice> = open.into_iter().map(Notice::EndPose).collect();
            worker::fire(&self.shared, notices);
            self.shared.events.action_list_changed(0);
        }
        was_active
    }

    fn spawn_worker(&self) -> Result<(), EngineError> {
        self.join_worker();
        let shared = self.shared.clone();
        let handle = thread::Builder::new()
            .name("gantry-worker".to_string())
            .spawn(move || worker::run(&shared))
            .map_err(|e| EngineError::Spawn("worker", e))?;
        *self.worker.lock() = Some(handle);
        Ok(())
    }

    /// Join the worker unless called from it.
    fn join_worker(&self) {
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                debug!("Skipping worker self-join");
                return;
            }
            if handle.join().is_err() {
                error!("Worker thread panicked");
            }
        }
    }

    // ── Accessors ──

    pub fn phase(&self) -> WorkPhase {
        self.shared.state.lock().machine.phase()
    }

    pub fn work_type(&self) -> Option<WorkType> {
        self.shared.state.lock().machine.work_type()
    }

    /// Packets not yet started, in send order.
    pub fn remaining_batch(&self) -> Vec<Packet> {
        self.shared.state.lock().batch.iter().cloned().collect()
    }

    /// Body range of the active batch.
    pub fn batch_offsets(&self) -> Option<(usize, usize)> {
        self.shared.state.lock().offsets
    }

    pub fn current_pose_set(&self) -> Option<usize> {
        self.shared.state.lock().current_pose_set
    }

    pub fn imaged_pose_sets(&self) -> Vec<usize> {
        self.shared.state.lock().imaged_pose_sets.clone()
    }

    pub fn is_clear_to_send(&self) -> bool {
        self.shared.cts.is_clear()
    }

    pub fn stats(&self) -> WorkerStats {
        self.shared.stats.lock().clone()
    }

    /// Block until no job is active. Returns `false` on timeout.
    pub fn wait_until_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if !self.shared.job_active() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            thread::sleep((deadline - now).min(self.shared.engine.poll_interval()));
        }
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.disconnect();
    }
}
