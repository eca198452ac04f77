//! Device status reports.
//!
//! Controllers report asynchronously with bracketed key/value lines:
//!
//! ```text
//! <id:2,ssf:0,pos:10.0,20.0,0.0,0.0,0.0>
//!  │     │     └─ x, y, z, pan, tilt
//!  │     └─ system status flags (u8)
//!  └─ device id
//! ```
//!
//! Anything that does not match this shape is passed through unchanged as
//! [`ParsedLine::Text`].

use bitflags::bitflags;
use std::fmt;

bitflags! {
    /// System status flags, one bit per activity.
    ///
    /// `0` means idle.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SystemStatus: u8 {
        const MOVING      = 1 << 0;
        const HOMING      = 1 << 1;
        const DWELLING    = 1 << 2;
        const SHUTTER     = 1 << 3;
        const FOCUSING    = 1 << 4;
        const BUFFER_FULL = 1 << 5;
        const ENDSTOP     = 1 << 6;
        /// Controller refuses motion until unlocked (`M511`).
        const LOCKED      = 1 << 7;
    }
}

/// Reported position, in wire units (degrees for pan and tilt).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub pan: f64,
    pub tilt: f64,
}

/// One parsed status report.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SerialResponse {
    pub device_id: u32,
    pub system_status_number: u8,
    pub position: Option<Position>,
    pub error: Option<String>,
}

impl SerialResponse {
    pub fn new(device_id: u32, status: SystemStatus) -> Self {
        Self {
            device_id,
            system_status_number: status.bits(),
            position: None,
            error: None,
        }
    }

    #[must_use]
    pub fn with_position(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }

    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    #[inline]
    pub fn status(&self) -> SystemStatus {
        SystemStatus::from_bits_retain(self.system_status_number)
    }

    #[inline]
    pub fn is_idle(&self) -> bool {
        self.system_status_number == 0
    }

    #[inline]
    pub fn is_locked(&self) -> bool {
        self.status().contains(SystemStatus::LOCKED)
    }

    /// Render in the report grammar.
    pub fn to_wire(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for SerialResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<id:{},ssf:{}", self.device_id, self.system_status_number)?;
        if let Some(p) = &self.position {
            write!(
                f,
                ",pos:{:.3},{:.3},{:.3},{:.3},{:.3}",
                p.x, p.y, p.z, p.pan, p.tilt
            )?;
        }
        if let Some(e) = &self.error {
            write!(f, ",ERR:{e}")?;
        }
        f.write_str(">")
    }
}

/// Result of parsing one inbound line.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedLine {
    Response(SerialResponse),
    /// Banners, diagnostics, malformed reports. Kept verbatim.
    Text(String),
}

/// Parse one inbound line. Never fails.
pub fn parse_response(line: &str) -> ParsedLine {
    line.trim()
        .strip_prefix('<')
        .and_then(|s| s.strip_suffix('>'))
        .and_then(parse_fields)
        .map_or_else(|| ParsedLine::Text(line.to_string()), ParsedLine::Response)
}

fn parse_fields(body: &str) -> Option<SerialResponse> {
    // Tokens without a key continue the previous field (pos has 5 values).
    let mut fields: Vec<(&str, Vec<&str>)> = Vec::new();
    for token in body.split(',') {
        match token.split_once(':') {
            Some((key, value)) => fields.push((key.trim(), vec![value.trim()])),
            None => fields.last_mut()?.1.push(token.trim()),
        }
    }

    let mut device_id = None;
    let mut response = SerialResponse::default();
    for (key, values) in fields {
        match key {
            "id" => device_id = Some(single(&values)?.parse().ok()?),
            "ssf" => response.system_status_number = single(&values)?.parse().ok()?,
            "pos" => response.position = Some(parse_position(&values)?),
            "ERR" => response.error = Some(values.join(",")),
            _ => {}
        }
    }
    response.device_id = device_id?;
    Some(response)
}

fn single<'a>(values: &[&'a str]) -> Option<&'a str> {
    match values {
        [value] => Some(*value),
        _ => None,
    }
}

fn parse_position(values: &[&str]) -> Option<Position> {
    let [x, y, z, pan, tilt] = values else {
        return None;
    };
    Some(Position {
        x: x.parse().ok()?,
        y: y.parse().ok()?,
        z: z.parse().ok()?,
        pan: pan.parse().ok()?,
        tilt: tilt.parse().ok()?,
    })
}
