//! Worker loop.
//!
//! One thread per working episode. Each iteration waits for clear-to-send,
//! takes the next run and sends it:
//!
//! ```text
//!   wait clear ──► next run ──► shutter delays ──► serial: take + write
//!        ▲                                         camera: dispatch
//!        └──────────────── complete run ◄──────────────┘
//! ```
//!
//! When nothing is left the same lock that observes the empty batch also
//! finishes the job, so a jog queued concurrently is either sent or starts
//! a new episode.

use super::{Shared, WorkState};
use crate::work::{JobControl, Packet, Run, TransitionResult, WorkEvent, WorkPhase, WorkType};
use gantry_common::protocol::{Code, Destination, serialize_all};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace};

/// Worker counters, readable through
/// [`Orchestrator::stats`](crate::Orchestrator::stats).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkerStats {
    /// Serial payloads written under the handshake.
    pub serial_writes: u64,
    /// Camera actions dispatched.
    pub camera_actions: u64,
    pub write_failures: u64,
    pub jobs_finished: u64,
    pub jobs_faulted: u64,
    /// Longest wait from a serial write to the next clear-to-send.
    pub max_ack_wait_us: u64,
    /// Sum of acknowledgment waits for average calculation.
    pub total_ack_wait_us: u64,
}

impl WorkerStats {
    fn record_ack(&mut self, waited: Duration) {
        let us = waited.as_micros() as u64;
        self.total_ack_wait_us += us;
        self.max_ack_wait_us = self.max_ack_wait_us.max(us);
    }

    /// Mean acknowledgment wait, zero before the first write.
    pub fn average_ack_wait_us(&self) -> u64 {
        if self.serial_writes == 0 {
            0
        } else {
            self.total_ack_wait_us / self.serial_writes
        }
    }
}

/// Side effect collected under the state lock and fired after it.
#[derive(Debug)]
pub(super) enum Notice {
    Remaining(usize),
    PoseSetStarted(usize),
    PoseSetImaged(usize),
    StartPose { device: u32, source: String },
    EndPose(u32),
}

pub(super) fn fire(shared: &Shared, notices: Vec<Notice>) {
    for notice in notices {
        match notice {
            Notice::Remaining(n) => shared.events.action_list_changed(n),
            Notice::PoseSetStarted(index) => shared.events.pose_set_started(index),
            Notice::PoseSetImaged(index) => shared.events.pose_set_imaged(index),
            Notice::StartPose { device, source } => {
                let record =
                    shared
                        .host
                        .activity
                        .start_pose(device, &source, shared.host.session_id);
                trace!("Activity record {} opened for device {}", record, device);
            }
            Notice::EndPose(device) => {
                if let Some(record) = shared.host.activity.end_pose(device) {
                    trace!("Activity record {} closed for device {}", record, device);
                }
            }
        }
    }
}

enum Next {
    Run(Run),
    Finished(WorkType, Vec<u32>),
    /// Not working any more.
    Halt,
}

enum Outcome {
    Finished(WorkType),
    Stopped,
}

pub(super) fn run(shared: &Shared) {
    debug!("Worker started");
    match panic::catch_unwind(AssertUnwindSafe(|| drive(shared))) {
        Ok(Outcome::Finished(kind)) => {
            shared.stats.lock().jobs_finished += 1;
            info!("{} job finished", kind);
            shared.events.job_finished(kind);
        }
        Ok(Outcome::Stopped) => teardown(shared),
        Err(payload) => {
            shared
                .control
                .abort(format!("worker panicked: {}", panic_message(payload.as_ref())));
            teardown(shared);
        }
    }
    debug!("Worker exited");
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}

fn drive(shared: &Shared) -> Outcome {
    let poll = shared.engine.poll_interval();
    let keep_working = || shared.control.keep_working();
    let mut last_write: Option<Instant> = None;

    loop {
        if !shared.cts.wait_clear(poll, keep_working) {
            return Outcome::Stopped;
        }
        if let Some(written) = last_write.take() {
            shared.stats.lock().record_ack(written.elapsed());
        }

        let run = match next_run(shared) {
            Next::Run(run) => run,
            Next::Finished(kind, _) => return Outcome::Finished(kind),
            Next::Halt => return Outcome::Stopped,
        };
        if !settle(shared, &run) {
            return Outcome::Stopped;
        }

        let sent = match run.destination {
            Destination::Serial => send_serial(shared, &run),
            Destination::Camera => send_camera(shared, &run),
        };
        match sent {
            Some(true) => {
                if run.destination == Destination::Serial {
                    last_write = Some(Instant::now());
                }
                complete_run(shared, &run);
            }
            Some(false) => {
                shared.stats.lock().write_failures += 1;
                shared
                    .control
                    .abort(format!("write failed: {:?}", run.payload()));
                return Outcome::Stopped;
            }
            None => return Outcome::Stopped,
        }
    }
}

fn next_run(shared: &Shared) -> Next {
    let mut notices = Vec::new();
    let mut homed = Vec::new();
    let next = {
        let mut state = shared.state.lock();
        let next = state.advance(&shared.control, &mut notices);
        if let Next::Finished(_, ids) = &next {
            // Homed before the job reads as idle.
            homed = shared.registry.mark_homed(ids);
        }
        next
    };
    shared.registry.notify(&homed);
    fire(shared, notices);
    next
}

impl WorkState {
    fn advance(&mut self, control: &JobControl, notices: &mut Vec<Notice>) -> Next {
        if self.machine.phase() != WorkPhase::Working {
            return Next::Halt;
        }
        loop {
            if let Some(run) = self.partial.front() {
                return Next::Run(run.clone());
            }
            if let Some(packet) = self.side_queue.pop_front() {
                self.load(packet, notices);
            } else if let Some(packet) = self.batch.pop_front() {
                notices.push(Notice::Remaining(self.batch.len()));
                self.track_pose_set(packet.pose_set, notices);
                self.load(packet, notices);
            } else {
                return self.finish(control, notices);
            }
        }
    }

    fn load(&mut self, packet: Packet, notices: &mut Vec<Notice>) {
        if packet.pose_set.is_some() {
            let mut devices: Vec<u32> = Vec::new();
            for action in &packet.actions {
                if !devices.contains(&action.device()) {
                    devices.push(action.device());
                }
            }
            for device in devices {
                let source =
                    serialize_all(packet.actions.iter().filter(|a| a.device() == device));
                notices.push(Notice::StartPose { device, source });
                self.open_records.push(device);
            }
        }
        self.partial = packet.runs().into();
    }

    /// Close the current pose set when leaving it, open the next one.
    fn track_pose_set(&mut self, tag: Option<usize>, notices: &mut Vec<Notice>) {
        if let Some(current) = self.current_pose_set {
            if tag != Some(current) {
                self.imaged_pose_sets.push(current);
                self.current_pose_set = None;
                notices.push(Notice::PoseSetImaged(current));
            }
        }
        if let Some(index) = tag {
            if self.current_pose_set != Some(index) {
                self.current_pose_set = Some(index);
                notices.push(Notice::PoseSetStarted(index));
            }
        }
    }

    fn finish(&mut self, control: &JobControl, notices: &mut Vec<Notice>) -> Next {
        self.track_pose_set(None, notices);
        let Some(kind) = self.machine.work_type() else {
            return Next::Halt;
        };
        match self.machine.handle_event(WorkEvent::Finish) {
            TransitionResult::Ok(_) => {
                control.stop();
                let homed = std::mem::take(&mut self.homing_devices);
                notices.extend(self.clear_job().into_iter().map(Notice::EndPose));
                Next::Finished(kind, homed)
            }
            TransitionResult::Rejected(_) => Next::Halt,
        }
    }
}

/// Apply pending shutter delays. Returns `false` when stopped meanwhile.
fn settle(shared: &Shared, run: &Run) -> bool {
    let (pre, post) = {
        let state = shared.state.lock();
        (
            run.has_shutter() && !state.pre_shutter_done,
            state.post_shutter_armed,
        )
    };
    if post && !delay(shared, shared.engine.post_shutter_delay()) {
        return false;
    }
    if pre && !delay(shared, shared.engine.pre_shutter_delay()) {
        return false;
    }

    let mut state = shared.state.lock();
    if pre {
        state.pre_shutter_done = true;
    }
    if post {
        state.post_shutter_armed = false;
    }
    true
}

/// Sleep in poll-sized steps while the job keeps working.
fn delay(shared: &Shared, total: Duration) -> bool {
    let poll = shared.engine.poll_interval();
    let deadline = Instant::now() + total;
    loop {
        if !shared.control.keep_working() {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep((deadline - now).min(poll));
    }
}

fn send_serial(shared: &Shared, run: &Run) -> Option<bool> {
    let devices = shared.resolve_all(&run.actions);
    let payload = run.payload();
    let mut marked = Vec::new();

    let sent = shared.cts.wait_and_take(
        shared.engine.poll_interval(),
        || shared.control.keep_working(),
        || {
            marked = shared.registry.mark_writing_serial(&devices, true);
            if shared.ports.write(&payload) {
                true
            } else {
                shared.registry.mark_writing_serial(&devices, false);
                marked.clear();
                false
            }
        },
    );
    shared.registry.notify(&marked);
    if sent == Some(true) {
        shared.stats.lock().serial_writes += 1;
        debug!("Sent {:?}", payload);
    }
    sent
}

fn send_camera(shared: &Shared, run: &Run) -> Option<bool> {
    if !shared.control.keep_working() {
        return None;
    }
    for action in &run.actions {
        let devices = shared.registry.resolve(action.device());
        shared.registry.set_writing_camera(&devices, true);
        for &device in &devices {
            shared.host.dispatch_camera(action, device);
        }
        shared.registry.set_writing_camera(&devices, false);
        shared.stats.lock().camera_actions += devices.len() as u64;
    }
    Some(true)
}

fn complete_run(shared: &Shared, run: &Run) {
    for action in &run.actions {
        match action.code() {
            Code::G90 => shared
                .registry
                .set_absolute(&shared.registry.resolve(action.device()), true),
            Code::G91 => shared
                .registry
                .set_absolute(&shared.registry.resolve(action.device()), false),
            _ => {}
        }
    }

    let mut notices = Vec::new();
    {
        let mut state = shared.state.lock();
        state.partial.pop_front();
        if run.has_shutter() {
            state.post_shutter_armed = true;
        }
        if state.partial.is_empty() {
            let closed = std::mem::take(&mut state.open_records);
            notices.extend(closed.into_iter().map(Notice::EndPose));
        }
    }
    fire(shared, notices);
}

/// Fault teardown. Paused and cancelled workers just exit.
fn teardown(shared: &Shared) {
    let Some(reason) = shared.control.take_fault() else {
        if shared.control.is_paused() {
            debug!("Worker paused");
        } else {
            debug!("Worker stopped");
        }
        return;
    };

    let (kind, open) = {
        let mut state = shared.state.lock();
        let kind = state.machine.work_type();
        match state.machine.handle_event(WorkEvent::Fault) {
            TransitionResult::Ok(_) => (kind, state.clear_job()),
            TransitionResult::Rejected(_) => (None, Vec::new()),
        }
    };
    shared.registry.clear_writing();
    fire(shared, open.into_iter().map(Notice::EndPose).collect());

    if let Some(kind) = kind {
        shared.stats.lock().jobs_faulted += 1;
        error!("{} job faulted: {}", kind, reason);
        shared.events.job_faulted(kind, &reason);
        shared.events.action_list_changed(0);
    }
}
