//! Per-gantry status model.
//!
//! A [`Device`] holds the last report received from one controller plus the
//! flags the orchestrator sets while it is writing to it. The derived
//! [`DeviceStatus`] is what the rest of the system reasons about:
//!
//! ```text
//!   last response has error          ─► Error
//!   writing flag set, or not idle    ─► Busy
//!   idle response, or homed & silent ─► Idle
//!   otherwise                        ─► Unknown
//! ```

use crate::protocol::SerialResponse;
use std::fmt;
use std::time::Instant;

/// Derived device status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceStatus {
    Idle,
    Busy,
    Error,
    Unknown,
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "IDLE",
            Self::Busy => "BUSY",
            Self::Error => "ERROR",
            Self::Unknown => "UNKNOWN",
        })
    }
}

/// One addressable gantry.
#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    pub id: u32,
    pub last_response: Option<SerialResponse>,
    pub is_homed: bool,
    /// A serial write is outstanding; cleared by the next report.
    pub is_writing_serial: bool,
    /// A camera SDK call is in progress.
    pub is_writing_camera: bool,
    /// `G90` confirmed on this connection.
    pub is_absolute: bool,
    pub last_reported_on: Option<Instant>,
}

impl Device {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            last_response: None,
            is_homed: false,
            is_writing_serial: false,
            is_writing_camera: false,
            is_absolute: false,
            last_reported_on: None,
        }
    }

    pub fn status(&self) -> DeviceStatus {
        match &self.last_response {
            Some(r) if r.error.is_some() => DeviceStatus::Error,
            _ if self.is_writing_serial || self.is_writing_camera => DeviceStatus::Busy,
            Some(r) if !r.is_idle() => DeviceStatus::Busy,
            Some(_) => DeviceStatus::Idle,
            None if self.is_homed => DeviceStatus::Idle,
            None => DeviceStatus::Unknown,
        }
    }

    #[inline]
    pub fn is_idle(&self) -> bool {
        self.status() == DeviceStatus::Idle
    }

    #[inline]
    pub fn is_locked(&self) -> bool {
        self.last_response.as_ref().is_some_and(|r| r.is_locked())
    }

    /// Error status or locked.
    #[inline]
    pub fn is_faulted(&self) -> bool {
        self.is_locked() || self.status() == DeviceStatus::Error
    }

    /// Record a report. Returns `true` when observable state changed.
    pub fn apply_response(&mut self, response: SerialResponse, now: Instant) -> bool {
        let changed = self.is_writing_serial || self.last_response.as_ref() != Some(&response);
        self.last_response = Some(response);
        self.is_writing_serial = false;
        self.last_reported_on = Some(now);
        changed
    }

    /// Carry reconciled state over from a previous connection.
    ///
    /// Only devices that were homed and had reported keep their state.
    pub fn reconcile_from(&mut self, previous: &Device) {
        if previous.is_homed && previous.last_response.is_some() {
            self.is_homed = true;
            self.last_response = previous.last_response.clone();
        }
    }
}
