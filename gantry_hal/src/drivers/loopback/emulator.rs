//! In-process gantry rig emulator.
//!
//! Answers command lines the way the real controllers do: every accepted
//! command produces one or more status reports, ending with the report that
//! returns the gantry to idle. Positions are kept in wire units (degrees for
//! pan and tilt).
//!
//! ```text
//!   >1G0X10   ─►  <id:1,ssf:1,pos:...>     moving
//!                 <id:1,ssf:0,pos:10,...>  idle
//! ```

use gantry_common::config::EmulatorConfig;
use gantry_common::protocol::{
    Action, Axis, Code, Position, SerialResponse, SystemStatus, deserialize, serialize,
};
use std::collections::BTreeMap;
use tracing::{debug, trace};

/// Emulator banner, sent as plain text on every open.
pub const BANNER: &str = "Gantry rig emulator ready";

/// State of one emulated gantry.
#[derive(Debug, Clone, PartialEq)]
pub struct EmulatedGantry {
    pub id: u32,
    pub position: Position,
    pub absolute: bool,
    pub homed: bool,
    pub locked: bool,
    pub engaged: bool,
}

impl EmulatedGantry {
    fn new(id: u32, locked: bool, homed: bool) -> Self {
        Self {
            id,
            position: Position::default(),
            absolute: false,
            homed,
            locked,
            engaged: false,
        }
    }

    fn report(&self, status: SystemStatus) -> String {
        let status = if self.locked {
            status | SystemStatus::LOCKED
        } else {
            status
        };
        SerialResponse::new(self.id, status)
            .with_position(self.position)
            .to_wire()
    }

    fn idle(&self) -> String {
        self.report(SystemStatus::empty())
    }

    /// Apply motion arguments in wire units.
    fn apply_motion(&mut self, action: &Action, absolute: bool) {
        for (axis, value) in action.args().iter() {
            let value = match axis {
                Axis::P | Axis::T => value.to_degrees(),
                _ => value,
            };
            let slot = match axis {
                Axis::X => &mut self.position.x,
                Axis::Y => &mut self.position.y,
                Axis::Z => &mut self.position.z,
                Axis::P => &mut self.position.pan,
                Axis::T => &mut self.position.tilt,
                Axis::F | Axis::S | Axis::V => continue,
            };
            if absolute {
                *slot = value;
            } else {
                *slot += value;
            }
        }
    }

    fn execute(&mut self, action: &Action, start_locked: bool) -> Vec<String> {
        let code = action.code();
        if self.locked && !matches!(code, Code::M120 | Code::M511 | Code::M998) {
            return vec![self.idle()];
        }

        match code {
            Code::G0 | Code::G1 | Code::G2 | Code::G3 => {
                self.engaged = true;
                let moving = self.report(SystemStatus::MOVING);
                self.apply_motion(action, self.absolute);
                vec![moving, self.idle()]
            }
            Code::G28 => {
                self.engaged = true;
                let homing = self.report(SystemStatus::HOMING);
                self.position = Position::default();
                self.homed = true;
                vec![homing, self.idle()]
            }
            Code::G4 => vec![self.report(SystemStatus::DWELLING), self.idle()],
            Code::G90 => {
                self.absolute = true;
                vec![self.idle()]
            }
            Code::G91 => {
                self.absolute = false;
                vec![self.idle()]
            }
            Code::G92 => {
                self.apply_motion(action, true);
                vec![self.idle()]
            }
            Code::M17 => {
                self.engaged = true;
                vec![self.idle()]
            }
            Code::M18 => {
                self.engaged = false;
                vec![self.idle()]
            }
            Code::M511 => {
                self.locked = false;
                vec![self.idle()]
            }
            Code::M998 => {
                *self = Self::new(self.id, start_locked, false);
                vec![BANNER.to_string(), self.idle()]
            }
            Code::C0 => vec![self.report(SystemStatus::SHUTTER), self.idle()],
            Code::C1 => vec![self.report(SystemStatus::FOCUSING), self.idle()],
            Code::E0 | Code::E1 | Code::E10 => {
                vec![format!("unsupported: {} is a camera command", code)]
            }
            Code::None => Vec::new(),
            Code::G17
            | Code::G18
            | Code::G19
            | Code::C10
            | Code::M0
            | Code::M24
            | Code::M120
            | Code::M360 => vec![self.idle()],
        }
    }
}

/// Emulated rig; survives link close/reopen.
#[derive(Debug, Clone)]
pub struct RigEmulator {
    gantries: BTreeMap<u32, EmulatedGantry>,
    start_locked: bool,
}

impl RigEmulator {
    pub fn new(config: &EmulatorConfig) -> Self {
        let gantries = config
            .devices
            .iter()
            .map(|&id| {
                (
                    id,
                    EmulatedGantry::new(id, config.start_locked, config.start_homed),
                )
            })
            .collect();
        Self {
            gantries,
            start_locked: config.start_locked,
        }
    }

    /// Lines sent when a link opens: banner plus one report per gantry.
    pub fn banner(&self) -> Vec<String> {
        std::iter::once(BANNER.to_string())
            .chain(self.gantries.values().map(EmulatedGantry::idle))
            .collect()
    }

    pub fn gantry(&self, id: u32) -> Option<&EmulatedGantry> {
        self.gantries.get(&id)
    }

    /// Lock a gantry, as an endstop hit would.
    pub fn lock(&mut self, id: u32) -> Option<String> {
        let gantry = self.gantries.get_mut(&id)?;
        gantry.locked = true;
        Some(gantry.idle())
    }

    /// Handle one command line and return the lines the rig answers with.
    pub fn handle_line(&mut self, line: &str) -> Vec<String> {
        let action = match deserialize(line) {
            Ok(action) => action,
            Err(e) => return vec![format!("error: {e}")],
        };
        if action.is_none() {
            return Vec::new();
        }
        trace!("Emulator <- {}", serialize(&action));

        let start_locked = self.start_locked;
        match action.device() {
            0 => self
                .gantries
                .values_mut()
                .flat_map(|g| g.execute(&action, start_locked))
                .collect(),
            id => match self.gantries.get_mut(&id) {
                Some(gantry) => gantry.execute(&action, start_locked),
                None => {
                    debug!("Emulator has no device {}", id);
                    Vec::new()
                }
            },
        }
    }
}
