//! Command codec.
//!
//! # Grammar
//!
//! ```text
//! command  := [">" device] code (axis value)*
//! device   := digit+
//! code     := ("G" | "M" | "C" | "E") digit+
//! axis     := "X" | "Y" | "Z" | "P" | "T" | "F" | "S" | "V"
//! value    := plain decimal, optional sign
//! ```
//!
//! Multiple commands on one write are joined with `\r`.
//!
//! Angular axes of `G` codes are converted radians to degrees on the way
//! out and back on the way in. That conversion is the only lossy step.

use super::ProtocolError;
use super::action::{Action, Args, Axis, Code, Family, Unit};
use crate::consts::COMMAND_SEPARATOR;
use std::fmt::Write;
use tracing::{debug, trace};

/// Render one action as a wire line without terminator.
///
/// [`Code::None`] renders as the empty string.
pub fn serialize(action: &Action) -> String {
    let code = action.code();
    if code.is_none() {
        return String::new();
    }

    let mut line = String::with_capacity(24);
    if action.device() != 0 {
        let _ = write!(line, ">{}", action.device());
    }
    line.push_str(code.name());

    for (axis, value) in action.args().iter() {
        let value = if code.converts_angles() && axis.unit() == Unit::Angular {
            value.to_degrees()
        } else {
            value
        };
        let _ = write!(line, "{}{}", axis.letter(), value);
    }
    line
}

/// Render several actions as one write, NONE entries skipped.
pub fn serialize_all<'a>(actions: impl IntoIterator<Item = &'a Action>) -> String {
    let mut out = String::new();
    for action in actions.into_iter().filter(|a| !a.is_none()) {
        if !out.is_empty() {
            out.push(COMMAND_SEPARATOR);
        }
        out.push_str(&serialize(action));
    }
    out
}

/// Split `s` at the first character failing `keep`.
fn take_while(s: &str, keep: impl Fn(char) -> bool) -> (&str, &str) {
    let end = s
        .char_indices()
        .find(|&(_, c)| !keep(c))
        .map_or(s.len(), |(i, _)| i);
    s.split_at(end)
}

#[inline]
fn is_numeric(c: char) -> bool {
    c.is_ascii_digit() || matches!(c, '.' | '+' | '-')
}

/// Parse one wire line.
///
/// Blank input yields a NONE action.
pub fn deserialize(line: &str) -> Result<Action, ProtocolError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(Action::none());
    }

    let mut device = 0u32;
    let mut code: Option<Code> = None;
    let mut args = Args::default();
    let mut rest = line;

    while let Some(c) = rest.chars().next() {
        let position = line.len() - rest.len();

        if c.is_whitespace() {
            rest = &rest[c.len_utf8()..];
            continue;
        }

        if c == '>' {
            let (digits, tail) = take_while(&rest[1..], |c| c.is_ascii_digit());
            device = digits
                .parse()
                .map_err(|_| ProtocolError::InvalidDevice(line.to_string()))?;
            rest = tail;
            continue;
        }

        if Family::from_letter(c).is_some() {
            let (digits, tail) = take_while(&rest[1..], |c| c.is_ascii_digit());
            let name = format!("{}{}", c.to_ascii_uppercase(), digits);
            let parsed = digits
                .parse()
                .ok()
                .and_then(|n| Code::from_parts(c, n))
                .ok_or_else(|| ProtocolError::UnknownCode(name.clone()))?;
            if code.is_some() {
                return Err(ProtocolError::DuplicateCode(line.to_string()));
            }
            code = Some(parsed);
            rest = tail;
            continue;
        }

        if let Some(axis) = Axis::from_letter(c) {
            let (text, tail) = take_while(&rest[1..], is_numeric);
            let value: f64 = text.parse().map_err(|_| ProtocolError::InvalidValue {
                axis: axis.letter(),
                text: text.to_string(),
            })?;
            args.set(axis, value);
            rest = tail;
            continue;
        }

        return Err(ProtocolError::UnexpectedCharacter {
            character: c,
            position,
        });
    }

    let code = code.ok_or_else(|| ProtocolError::MissingCode(line.to_string()))?;
    if code.converts_angles() {
        args.map_unit(Unit::Angular, f64::to_radians);
    }
    Ok(Action::from_parts(code, device, args))
}

/// Parse one wire line, failing closed to a NONE action.
pub fn deserialize_or_noop(line: &str) -> (Action, Option<ProtocolError>) {
    match deserialize(line) {
        Ok(action) => (action, None),
        Err(e) => (Action::none(), Some(e)),
    }
}

/// Parse multi-line text such as a homing sequence.
///
/// Lines split on CR or LF; blank lines and `;` comments are skipped.
/// A line that fails to parse contributes a NONE action and its error.
pub fn deserialize_sequence(text: &str) -> (Vec<Action>, Vec<ProtocolError>) {
    let mut actions = Vec::new();
    let mut errors = Vec::new();

    for raw in text.split(['\r', '\n']) {
        let line = raw.split(';').next().unwrap_or_default().trim();
        if line.is_empty() {
            if !raw.trim().is_empty() {
                trace!("Skipping comment {:?}", raw.trim());
            }
            continue;
        }
        let (action, error) = deserialize_or_noop(line);
        if let Some(e) = &error {
            debug!("Sequence line {:?} rejected: {}", line, e);
        }
        actions.push(action);
        errors.extend(error);
    }
    debug!(
        "Parsed sequence: {} actions, {} rejected",
        actions.len(),
        errors.len()
    );
    (actions, errors)
}
