//! Report listener.
//!
//! One thread per open connection. Reads lines, folds reports into the
//! registry, grants clear-to-send and stops a job when the rig locks.
//!
//! On a fresh connection the listener also recovers the rig: faulted
//! devices are unlocked once (at connect or within the report grace
//! window) and devices still silent after the grace window are queried
//! once.

use crate::error::EngineError;
use crate::orchestrator::Shared;
use gantry_common::protocol::{ParsedLine, SerialResponse, parse_response};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Handle to a running listener thread.
pub(crate) struct Listener {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Listener {
    pub(crate) fn spawn(shared: Arc<Shared>) -> Result<Self, EngineError> {
        let stop = Arc::new(AtomicBool::new(false));
        let handle = thread::Builder::new()
            .name("gantry-listener".to_string())
            .spawn({
                let stop = stop.clone();
                move || Session::new(&shared).run(&stop)
            })
            .map_err(|e| EngineError::Spawn("listener", e))?;
        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    /// Signal and join, unless called from the listener thread itself.
    pub(crate) fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.thread().id() == thread::current().id() {
                debug!("Skipping listener self-join");
                return;
            }
            if handle.join().is_err() {
                error!("Listener thread panicked");
            }
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Per-connection listener state.
struct Session<'a> {
    shared: &'a Shared,
    connected_at: Instant,
    unlock_sent: bool,
    query_sent: bool,
    was_idle: bool,
}

impl<'a> Session<'a> {
    fn new(shared: &'a Shared) -> Self {
        Self {
            shared,
            connected_at: Instant::now(),
            unlock_sent: false,
            query_sent: false,
            was_idle: false,
        }
    }

    fn run(mut self, stop: &AtomicBool) {
        info!("Listener started");
        self.recover();

        while !stop.load(Ordering::SeqCst) {
            match self.shared.ports.read_line() {
                Some(line) => self.handle_line(&line),
                None if !self.shared.ports.is_open() => {
                    warn!("Link closed, listener exiting");
                    break;
                }
                None => {}
            }
            self.query_silent();
        }
        debug!("Listener exited");
    }

    fn in_grace(&self) -> bool {
        self.connected_at.elapsed() < self.shared.engine.report_grace()
    }

    /// Unlock the rig once when a device is faulted at connect or within
    /// the grace window. Every device is unlocked, including ones that
    /// have not reported yet.
    fn recover(&mut self) {
        if self.unlock_sent || !self.in_grace() || !self.shared.registry.any_faulted() {
            return;
        }
        self.unlock_sent = true;
        let ids = self.shared.registry.ids();
        info!("Rig faulted, unlocking devices {:?}", ids);
        if !self.shared.unlock_devices(&ids) {
            warn!("Unlock sequence could not be sent");
        }
    }

    /// Query devices that stayed silent through the grace window, once.
    fn query_silent(&mut self) {
        if self.query_sent || self.in_grace() {
            return;
        }
        self.query_sent = true;
        let silent = self.shared.registry.unreported_since(self.connected_at);
        if silent.is_empty() {
            return;
        }
        info!("No report from devices {:?}, querying", silent);
        if !self.shared.query_devices(&silent) {
            warn!("Status query could not be sent");
        }
    }

    fn handle_line(&mut self, line: &str) {
        match parse_response(line) {
            ParsedLine::Response(response) => self.handle_response(response),
            ParsedLine::Text(text) => debug!("Rig: {}", text),
        }
    }

    fn handle_response(&mut self, response: SerialResponse) {
        let shared = self.shared;
        let id = response.device_id;
        let was_locked = shared.registry.device(id).is_some_and(|d| d.is_locked());
        let now_locked = response.is_locked();

        if shared.registry.apply_response(response).is_none() {
            warn!("Report from unknown device {}", id);
            return;
        }

        if shared.control.keep_working()
            && shared.registry.any_locked()
            && shared.control.abort("machine locked")
        {
            error!("Machine locked, stopping job");
        }
        self.recover();

        if was_locked && !now_locked {
            info!("Device {} unlocked", id);
            shared.cts.grant();
        } else {
            shared.cts.grant_if(|| shared.registry.all_idle());
        }

        let idle = shared.registry.all_idle() && !shared.job_active();
        if idle && !self.was_idle {
            shared.events.machine_idle();
        }
        self.was_idle = idle;
    }
}
