//! Prelude module for common re-exports.
//!
//! ```rust
//! use gantry_common::prelude::*;
//! ```

use std::time::Duration;

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{
    ConfigError, ConfigLoader, EmulatorConfig, EngineConfig, GantryConfig, LogLevel,
    SharedConfig, TransportConfig,
};

// ─── Protocol ───────────────────────────────────────────────────────
pub use crate::protocol::{
    Action, Args, Axis, Code, Destination, ParsedLine, Position, ProtocolError, SerialResponse,
    SystemStatus, Unit, deserialize, deserialize_or_noop, deserialize_sequence, parse_response,
    serialize, serialize_all,
};

// ─── Devices ────────────────────────────────────────────────────────
pub use crate::device::{Device, DeviceStatus};

// ─── System Constants ───────────────────────────────────────────────
pub use crate::consts::{DEFAULT_BAUD, LOOPBACK_PORT_NAME, POLL_INTERVAL_MS};

/// Default polling interval as Duration.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(POLL_INTERVAL_MS);
