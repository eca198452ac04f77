//! Shared harness: a scripted port the test feeds reports into and reads
//! writes back from.

pub mod handshake;
pub mod imaging;
pub mod lifecycle;
pub mod loopback;
pub mod shutter;

use crossbeam_channel::{Receiver, Sender, unbounded};
use gantry_common::config::{EngineConfig, TransportConfig};
use gantry_control::{Host, JobListener, Orchestrator, Project, WorkType};
use gantry_hal::{
    LineReader, LineWriter, Link, PortDescriptor, PortDriver, PortKind, PortManager,
    TransportError,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

pub const PORT: &str = "mock";
pub const GRACE_MS: u64 = 100;
pub const TIMEOUT: Duration = Duration::from_secs(5);

// ── Scripted port ──

pub struct MockPort {
    inbound: Receiver<String>,
    outbound: Sender<String>,
    pub opens: AtomicUsize,
}

struct MockReader {
    rx: Receiver<String>,
    timeout: Duration,
}

impl LineReader for MockReader {
    fn read_line(&mut self) -> Result<Option<String>, TransportError> {
        Ok(self.rx.recv_timeout(self.timeout).ok())
    }
}

struct MockWriter {
    tx: Sender<String>,
}

impl LineWriter for MockWriter {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.tx
            .send(String::from_utf8_lossy(bytes).into_owned())
            .map_err(|_| TransportError::Closed)
    }
}

impl PortDriver for MockPort {
    fn descriptor(&self) -> PortDescriptor {
        PortDescriptor::new(PORT, "scripted rig", PortKind::Virtual)
    }

    fn open(&self, _baud: u32, read_timeout: Duration) -> Result<Link, TransportError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Link {
            reader: Box::new(MockReader {
                rx: self.inbound.clone(),
                timeout: read_timeout,
            }),
            writer: Box::new(MockWriter {
                tx: self.outbound.clone(),
            }),
        })
    }
}

// ── Job events ──

#[derive(Default)]
pub struct JobEvents {
    pub finished: AtomicUsize,
    pub faulted: AtomicUsize,
    pub imaged: AtomicUsize,
    pub idle: AtomicUsize,
}

impl JobListener for JobEvents {
    fn machine_idle(&self) {
        self.idle.fetch_add(1, Ordering::SeqCst);
    }

    fn pose_set_imaged(&self, _index: usize) {
        self.imaged.fetch_add(1, Ordering::SeqCst);
    }

    fn job_finished(&self, _kind: WorkType) {
        self.finished.fetch_add(1, Ordering::SeqCst);
    }

    fn job_faulted(&self, _kind: WorkType, _reason: &str) {
        self.faulted.fetch_add(1, Ordering::SeqCst);
    }
}

// ── Rig ──

pub fn engine() -> EngineConfig {
    EngineConfig {
        poll_interval_ms: 2,
        report_grace_ms: GRACE_MS,
        ..EngineConfig::default()
    }
}

pub fn transport() -> TransportConfig {
    TransportConfig {
        read_timeout_ms: 20,
        ..TransportConfig::default()
    }
}

pub struct Rig {
    pub orchestrator: Orchestrator,
    pub port: Arc<MockPort>,
    pub events: Arc<JobEvents>,
    inject: Sender<String>,
    written: Receiver<String>,
}

impl Rig {
    /// Connected rig whose devices have all reported idle.
    pub fn connected(project: Project) -> Self {
        Self::with_host(project, Host::default())
    }

    pub fn with_host(project: Project, host: Host) -> Self {
        let ids = project.devices.clone();
        Self::disconnected(project, host).settle(&ids)
    }

    /// Connected rig running with custom engine timings.
    pub fn connected_with(project: Project, engine: EngineConfig) -> Self {
        let ids = project.devices.clone();
        Self::disconnected_with(project, Host::default(), engine).settle(&ids)
    }

    fn settle(self, ids: &[u32]) -> Self {
        self.orchestrator.connect().unwrap();
        self.report_idle(ids);
        assert!(wait_for(|| self.orchestrator.is_clear_to_send()));
        // Past the grace window, so the listener stays quiet.
        thread::sleep(Duration::from_millis(GRACE_MS + 20));
        self.drain_writes();
        self
    }

    pub fn disconnected(project: Project, host: Host) -> Self {
        Self::disconnected_with(project, host, engine())
    }

    pub fn disconnected_with(project: Project, host: Host, engine: EngineConfig) -> Self {
        let (inject, inbound) = unbounded();
        let (outbound, written) = unbounded();
        let port = Arc::new(MockPort {
            inbound,
            outbound,
            opens: AtomicUsize::new(0),
        });

        let ports = Arc::new(PortManager::new(transport()));
        ports.register(port.clone()).unwrap();
        let orchestrator = Orchestrator::with_engine(engine, ports, host);
        let events = Arc::new(JobEvents::default());
        orchestrator.events().register_job_listener(events.clone());
        orchestrator.open_project(project).unwrap();
        orchestrator.select_port(PORT).unwrap();

        Self {
            orchestrator,
            port,
            events,
            inject,
            written,
        }
    }

    pub fn inject(&self, line: &str) {
        self.inject.send(line.to_string()).unwrap();
    }

    pub fn report_idle(&self, ids: &[u32]) {
        for id in ids {
            self.inject(&format!("<id:{id},ssf:0>"));
        }
    }

    /// Next written payload without its terminator.
    pub fn next_write(&self) -> String {
        let line = self
            .written
            .recv_timeout(TIMEOUT)
            .expect("expected a write");
        line.trim_end_matches('\r').to_string()
    }

    pub fn no_write_within(&self, window: Duration) -> bool {
        self.written.recv_timeout(window).is_err()
    }

    pub fn drain_writes(&self) -> Vec<String> {
        self.written.try_iter().collect()
    }
}

/// Poll `condition` until it holds or [`TIMEOUT`] passes.
pub fn wait_for(condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + TIMEOUT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}
