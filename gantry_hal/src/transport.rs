//! Port driver trait, link halves and error types.
//!
//! This module defines:
//! - `PortDriver` trait - Interface for pluggable ports
//! - `Link` - The reader/writer pair returned by `PortDriver::open`
//! - `LineFramer` - Splits a byte stream into report lines
//! - `TransportError` enum - Error types for port operations

use gantry_common::consts::MAX_LINE_BYTES;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Error types for port operations.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No driver or physical port with this name.
    #[error("Port not found: {0}")]
    PortNotFound(String),

    /// `open` called before `select`.
    #[error("No port selected")]
    NoPortSelected,

    /// Driver failed to open the device.
    #[error("Failed to open port {port}: {reason}")]
    OpenFailed { port: String, reason: String },

    /// A driver with the same port name is already registered.
    #[error("Port driver already registered: {0}")]
    DuplicatePort(String),

    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer side of the link went away.
    #[error("Link closed")]
    Closed,
}

/// Kind of port behind a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortKind {
    /// Physical serial device.
    Serial,
    /// In-process emulated rig.
    Loopback,
    /// Any other registered driver (test harnesses, bridges).
    Virtual,
}

/// Enumerated port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortDescriptor {
    pub name: String,
    pub description: String,
    pub kind: PortKind,
}

impl PortDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>, kind: PortKind) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            kind,
        }
    }
}

impl fmt::Display for PortDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.description)
    }
}

/// Read half of a link.
pub trait LineReader: Send {
    /// Next complete line without terminator.
    ///
    /// Blocks at most the read timeout given to `open`; `Ok(None)` when it
    /// elapses without a full line.
    fn read_line(&mut self) -> Result<Option<String>, TransportError>;
}

/// Write half of a link.
pub trait LineWriter: Send {
    /// Write all bytes. The caller supplies the terminator.
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), TransportError>;
}

/// An open connection.
pub struct Link {
    pub reader: Box<dyn LineReader>,
    pub writer: Box<dyn LineWriter>,
}

/// Trait defining the interface for port drivers.
///
/// The port manager opens drivers through this trait, enabling serial
/// hardware, the loopback emulator and test harnesses to be swapped freely.
///
/// # Lifecycle
///
/// 1. `descriptor()` - Listed by enumeration, matched by `select`
/// 2. `open()` - Called on connect, may be called again after a close
/// 3. Dropping the `Link` closes the connection
pub trait PortDriver: Send + Sync {
    fn descriptor(&self) -> PortDescriptor;

    /// Open a fresh link.
    ///
    /// # Errors
    /// Return `TransportError::OpenFailed` if the device cannot be opened.
    fn open(&self, baud: u32, read_timeout: Duration) -> Result<Link, TransportError>;
}

/// Accumulates raw bytes and yields complete lines.
///
/// Lines end at CR or LF; empty lines are dropped. Invalid UTF-8 is
/// replaced rather than rejected. An unterminated tail longer than
/// [`MAX_LINE_BYTES`] loses its oldest bytes.
#[derive(Debug, Default)]
pub struct LineFramer {
    buffer: Vec<u8>,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
        let tail = self
            .buffer
            .iter()
            .rposition(|&b| b == b'\r' || b == b'\n')
            .map_or(0, |end| end + 1);
        let excess = (self.buffer.len() - tail).saturating_sub(MAX_LINE_BYTES);
        if excess > 0 {
            warn!("Dropping {} bytes of unterminated input", excess);
            self.buffer.drain(tail..tail + excess);
        }
    }

    /// Pop the next complete non-empty line.
    pub fn next_line(&mut self) -> Option<String> {
        loop {
            let end = self.buffer.iter().position(|&b| b == b'\r' || b == b'\n')?;
            let line: Vec<u8> = self.buffer.drain(..=end).take(end).collect();
            if !line.is_empty() {
                return Some(String::from_utf8_lossy(&line).into_owned());
            }
        }
    }

    /// Bytes waiting for a terminator.
    #[inline]
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }
}
