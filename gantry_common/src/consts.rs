//! System-wide constants for the gantry workspace.
//!
//! Single source of truth for timing defaults and wire limits.
//! Imported by all crates, never duplicated.

/// Default service name used for logging.
pub const SERVICE_NAME: &str = "gantry";

/// Default serial baud rate of the gantry controllers.
pub const DEFAULT_BAUD: u32 = 115_200;

/// Upper bound of a single blocking line read, in milliseconds.
pub const READ_TIMEOUT_MS: u64 = 250;

/// Window after connect in which every device is expected to report.
pub const REPORT_GRACE_MS: u64 = 1000;

/// Polling interval of every cancellable wait, in milliseconds.
pub const POLL_INTERVAL_MS: u64 = 10;

/// Hard cap applied to any shutter delay, in milliseconds.
pub const MAX_DELAY_MS: u64 = 60_000;

/// Line terminator appended to every write.
pub const LINE_TERMINATOR: &str = "\r";

/// Separator joining multiple serialized commands on one write.
pub const COMMAND_SEPARATOR: char = '\r';

/// Longest unterminated input kept while waiting for a line end.
pub const MAX_LINE_BYTES: usize = 4096;

/// Name of the synthetic in-process port.
pub const LOOPBACK_PORT_NAME: &str = "loopback";

/// Port descriptions hidden from enumeration by default.
pub const DEFAULT_IGNORE_PATTERNS: &[&str] = &["bluetooth", "debug-console", "wlan"];

/// Highest addressable device id.
pub const MAX_DEVICE_ID: u32 = 255;

/// Number of axis slots in an action argument list.
pub const AXIS_COUNT: usize = 8;
