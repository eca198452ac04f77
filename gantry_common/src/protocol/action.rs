//! Action model.
//!
//! An [`Action`] is one addressed command: a [`Code`], a target device and
//! a set of axis arguments. Actions are immutable once built; the builder
//! methods consume and return `self`.
//!
//! # Destinations
//!
//! ```text
//!   G*, M*, C*  ──► serial transport  (gantry controller)
//!   E*          ──► camera control    (vendor SDK)
//! ```
//!
//! # Units
//!
//! Every [`Axis`] carries a unit tag. Angular axes (pan, tilt) are held in
//! radians; the codec converts them to degrees on the wire for motion codes.

use crate::consts::AXIS_COUNT;
use std::fmt;

// ─── Codes ──────────────────────────────────────────────────────────

/// Command family, the leading letter of a code name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    None,
    /// Motion and coordinate modes.
    G,
    /// Machine control.
    M,
    /// Controller-side shutter and focus.
    C,
    /// Camera SDK commands.
    E,
}

impl Family {
    /// Family for a code letter (case-insensitive).
    pub fn from_letter(letter: char) -> Option<Self> {
        match letter.to_ascii_uppercase() {
            'G' => Some(Self::G),
            'M' => Some(Self::M),
            'C' => Some(Self::C),
            'E' => Some(Self::E),
            _ => None,
        }
    }
}

/// Where an action is dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Destination {
    Serial,
    Camera,
}

/// Known command codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Code {
    /// No-op, serializes to an empty line.
    #[default]
    None,
    /// Rapid move.
    G0,
    /// Linear move.
    G1,
    /// Clockwise arc.
    G2,
    /// Counter-clockwise arc.
    G3,
    /// Dwell.
    G4,
    G17,
    G18,
    G19,
    /// Home.
    G28,
    /// Absolute positioning.
    G90,
    /// Relative positioning.
    G91,
    /// Set position.
    G92,
    /// Shutter.
    C0,
    /// Focus.
    C1,
    /// Shutter release.
    C10,
    /// Stop.
    M0,
    /// Engage motors.
    M17,
    /// Disengage motors.
    M18,
    /// Resume.
    M24,
    /// Status query.
    M120,
    M360,
    /// Unlock.
    M511,
    /// Controller reset.
    M998,
    /// Camera shutter.
    E0,
    /// Camera focus.
    E1,
    /// Camera connect.
    E10,
}

impl Code {
    /// Every code except [`Code::None`].
    pub const ALL: [Code; 26] = [
        Code::G0,
        Code::G1,
        Code::G2,
        Code::G3,
        Code::G4,
        Code::G17,
        Code::G18,
        Code::G19,
        Code::G28,
        Code::G90,
        Code::G91,
        Code::G92,
        Code::C0,
        Code::C1,
        Code::C10,
        Code::M0,
        Code::M17,
        Code::M18,
        Code::M24,
        Code::M120,
        Code::M360,
        Code::M511,
        Code::M998,
        Code::E0,
        Code::E1,
        Code::E10,
    ];

    /// Wire name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::None => "",
            Self::G0 => "G0",
            Self::G1 => "G1",
            Self::G2 => "G2",
            Self::G3 => "G3",
            Self::G4 => "G4",
            Self::G17 => "G17",
            Self::G18 => "G18",
            Self::G19 => "G19",
            Self::G28 => "G28",
            Self::G90 => "G90",
            Self::G91 => "G91",
            Self::G92 => "G92",
            Self::C0 => "C0",
            Self::C1 => "C1",
            Self::C10 => "C10",
            Self::M0 => "M0",
            Self::M17 => "M17",
            Self::M18 => "M18",
            Self::M24 => "M24",
            Self::M120 => "M120",
            Self::M360 => "M360",
            Self::M511 => "M511",
            Self::M998 => "M998",
            Self::E0 => "E0",
            Self::E1 => "E1",
            Self::E10 => "E10",
        }
    }

    pub const fn family(self) -> Family {
        match self {
            Self::None => Family::None,
            Self::G0
            | Self::G1
            | Self::G2
            | Self::G3
            | Self::G4
            | Self::G17
            | Self::G18
            | Self::G19
            | Self::G28
            | Self::G90
            | Self::G91
            | Self::G92 => Family::G,
            Self::C0 | Self::C1 | Self::C10 => Family::C,
            Self::M0
            | Self::M17
            | Self::M18
            | Self::M24
            | Self::M120
            | Self::M360
            | Self::M511
            | Self::M998 => Family::M,
            Self::E0 | Self::E1 | Self::E10 => Family::E,
        }
    }

    /// Resolve a family letter and number, e.g. `('G', 28)`.
    pub fn from_parts(letter: char, number: u32) -> Option<Self> {
        let family = Family::from_letter(letter)?;
        Self::ALL
            .iter()
            .copied()
            .find(|code| code.family() == family && code.number() == Some(number))
    }

    fn number(self) -> Option<u32> {
        self.name().get(1..).and_then(|n| n.parse().ok())
    }

    #[inline]
    pub const fn is_none(self) -> bool {
        matches!(self, Self::None)
    }

    /// Angular arguments travel in degrees for motion codes.
    #[inline]
    pub const fn converts_angles(self) -> bool {
        matches!(self.family(), Family::G)
    }

    #[inline]
    pub const fn destination(self) -> Destination {
        match self.family() {
            Family::E => Destination::Camera,
            _ => Destination::Serial,
        }
    }

    /// Codes that expose a frame.
    #[inline]
    pub const fn is_shutter(self) -> bool {
        matches!(self, Self::C0 | Self::E0)
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ─── Axes ───────────────────────────────────────────────────────────

/// Unit tag of an axis value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Unit {
    /// Millimetres.
    Linear,
    /// Radians in memory, degrees on the wire for motion codes.
    Angular,
    /// Feed rates, switches, speeds.
    Scalar,
}

/// Argument letters, in canonical emission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Axis {
    X,
    Y,
    Z,
    /// Pan.
    P,
    /// Tilt.
    T,
    /// Feed rate.
    F,
    /// Switch / seconds.
    S,
    /// Velocity.
    V,
}

impl Axis {
    pub const ALL: [Axis; AXIS_COUNT] = [
        Axis::X,
        Axis::Y,
        Axis::Z,
        Axis::P,
        Axis::T,
        Axis::F,
        Axis::S,
        Axis::V,
    ];

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn letter(self) -> char {
        match self {
            Self::X => 'X',
            Self::Y => 'Y',
            Self::Z => 'Z',
            Self::P => 'P',
            Self::T => 'T',
            Self::F => 'F',
            Self::S => 'S',
            Self::V => 'V',
        }
    }

    /// Axis for an argument letter (case-insensitive).
    pub fn from_letter(letter: char) -> Option<Self> {
        let letter = letter.to_ascii_uppercase();
        Self::ALL.iter().copied().find(|a| a.letter() == letter)
    }

    pub const fn unit(self) -> Unit {
        match self {
            Self::X | Self::Y | Self::Z => Unit::Linear,
            Self::P | Self::T => Unit::Angular,
            Self::F | Self::S | Self::V => Unit::Scalar,
        }
    }
}

/// Axis arguments with an explicit presence flag per axis.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Args {
    values: [Option<f64>; AXIS_COUNT],
}

impl Args {
    #[inline]
    pub fn get(&self, axis: Axis) -> Option<f64> {
        self.values[axis.index()]
    }

    #[inline]
    pub fn set(&mut self, axis: Axis, value: f64) {
        self.values[axis.index()] = Some(value);
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.iter().all(Option::is_none)
    }

    /// Present arguments in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (Axis, f64)> + '_ {
        Axis::ALL
            .iter()
            .filter_map(|&axis| self.get(axis).map(|v| (axis, v)))
    }

    /// Apply `f` to every present value of the given unit.
    pub(crate) fn map_unit(&mut self, unit: Unit, f: impl Fn(f64) -> f64) {
        for axis in Axis::ALL {
            if axis.unit() == unit {
                if let Some(v) = self.values[axis.index()].as_mut() {
                    *v = f(*v);
                }
            }
        }
    }
}

// ─── Action ─────────────────────────────────────────────────────────

/// One addressed command.
///
/// `device == 0` is the broadcast/primary address.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Action {
    code: Code,
    device: u32,
    args: Args,
}

impl Action {
    pub fn new(code: Code, device: u32) -> Self {
        Self {
            code,
            device,
            args: Args::default(),
        }
    }

    /// Full constructor used by the codec.
    pub fn from_parts(code: Code, device: u32, args: Args) -> Self {
        Self { code, device, args }
    }

    /// Builder: set one argument.
    #[must_use]
    pub fn with(mut self, axis: Axis, value: f64) -> Self {
        self.args.set(axis, value);
        self
    }

    pub fn none() -> Self {
        Self::default()
    }

    /// `G90` for one device.
    pub fn absolute(device: u32) -> Self {
        Self::new(Code::G90, device)
    }

    /// `M18` for one device.
    pub fn disengage(device: u32) -> Self {
        Self::new(Code::M18, device)
    }

    /// `M120` for one device.
    pub fn query(device: u32) -> Self {
        Self::new(Code::M120, device)
    }

    /// `M511` for one device.
    pub fn unlock(device: u32) -> Self {
        Self::new(Code::M511, device)
    }

    #[inline]
    pub fn code(&self) -> Code {
        self.code
    }

    #[inline]
    pub fn device(&self) -> u32 {
        self.device
    }

    #[inline]
    pub fn args(&self) -> &Args {
        &self.args
    }

    #[inline]
    pub fn is_none(&self) -> bool {
        self.code.is_none()
    }

    #[inline]
    pub fn destination(&self) -> Destination {
        self.code.destination()
    }

    /// All argument values are finite.
    pub fn is_well_formed(&self) -> bool {
        self.args.iter().all(|(_, v)| v.is_finite())
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&super::codec::serialize(self))
    }
}
