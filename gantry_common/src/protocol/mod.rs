//! Wire protocol.
//!
//! - [`action`] - Codes, axes and the immutable [`Action`] value
//! - [`codec`] - Command serialization and parsing
//! - [`response`] - Status report parsing

pub mod action;
pub mod codec;
pub mod response;

pub use action::{Action, Args, Axis, Code, Destination, Family, Unit};
pub use codec::{deserialize, deserialize_or_noop, deserialize_sequence, serialize, serialize_all};
pub use response::{ParsedLine, Position, SerialResponse, SystemStatus, parse_response};

use thiserror::Error;

/// Command parsing errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProtocolError {
    /// Code letter followed by an unknown number.
    #[error("Unknown command code: {0}")]
    UnknownCode(String),

    /// Line has arguments but no code.
    #[error("Missing command code in line: {0}")]
    MissingCode(String),

    /// More than one code on a single line.
    #[error("Duplicate command code in line: {0}")]
    DuplicateCode(String),

    /// `>` not followed by a valid device id.
    #[error("Invalid device address in line: {0}")]
    InvalidDevice(String),

    /// Axis letter with a missing or non-numeric value.
    #[error("Invalid value for axis {axis}: {text:?}")]
    InvalidValue { axis: char, text: String },

    #[error("Unexpected character {character:?} at offset {position}")]
    UnexpectedCharacter { character: char, position: usize },
}
