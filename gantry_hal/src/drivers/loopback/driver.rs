//! Loopback driver implementation.

use super::emulator::RigEmulator;
use crate::transport::{
    LineFramer, LineReader, LineWriter, Link, PortDescriptor, PortDriver, PortKind,
    TransportError,
};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use gantry_common::config::EmulatorConfig;
use gantry_common::consts::LOOPBACK_PORT_NAME;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Loopback driver implementing the `PortDriver` trait.
///
/// The emulator is shared by every link the driver opens, so rig state
/// (homed, locked, positions) persists across reconnects.
pub struct LoopbackDriver {
    emulator: Arc<Mutex<RigEmulator>>,
}

impl LoopbackDriver {
    pub fn new(config: &EmulatorConfig) -> Self {
        Self {
            emulator: Arc::new(Mutex::new(RigEmulator::new(config))),
        }
    }

    /// Shared handle to the emulated rig, for fault injection.
    pub fn emulator(&self) -> Arc<Mutex<RigEmulator>> {
        Arc::clone(&self.emulator)
    }
}

impl PortDriver for LoopbackDriver {
    fn descriptor(&self) -> PortDescriptor {
        PortDescriptor::new(LOOPBACK_PORT_NAME, "Emulated gantry rig", PortKind::Loopback)
    }

    fn open(&self, _baud: u32, read_timeout: Duration) -> Result<Link, TransportError> {
        let (tx, rx) = unbounded();
        for line in self.emulator.lock().banner() {
            tx.send(line).map_err(|_| TransportError::Closed)?;
        }
        debug!("Loopback link opened");

        Ok(Link {
            reader: Box::new(LoopbackReader { rx, read_timeout }),
            writer: Box::new(LoopbackWriter {
                emulator: Arc::clone(&self.emulator),
                tx,
                framer: LineFramer::new(),
            }),
        })
    }
}

struct LoopbackReader {
    rx: Receiver<String>,
    read_timeout: Duration,
}

impl LineReader for LoopbackReader {
    fn read_line(&mut self) -> Result<Option<String>, TransportError> {
        match self.rx.recv_timeout(self.read_timeout) {
            Ok(line) => Ok(Some(line)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(TransportError::Closed),
        }
    }
}

struct LoopbackWriter {
    emulator: Arc<Mutex<RigEmulator>>,
    tx: Sender<String>,
    framer: LineFramer,
}

impl LineWriter for LoopbackWriter {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        self.framer.push(bytes);
        while let Some(line) = self.framer.next_line() {
            let replies = self.emulator.lock().handle_line(&line);
            for reply in replies {
                self.tx.send(reply).map_err(|_| TransportError::Closed)?;
            }
        }
        Ok(())
    }
}
