//! Configuration loading traits and types.
//!
//! Every gantry binary reads one TOML file. All sections are optional and
//! fall back to the constants in [`crate::consts`].
//!
//! # TOML Example
//!
//! ```toml
//! [shared]
//! log_level = "debug"
//! service_name = "gantry-rig-01"
//!
//! [transport]
//! baud = 115200
//! read_timeout_ms = 250
//! ignore_patterns = ["bluetooth"]
//! development = true
//!
//! [engine]
//! report_grace_ms = 1000
//! pre_shutter_delay_ms = 500
//! post_shutter_delay_ms = 200
//!
//! [emulator]
//! devices = [1, 2]
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use gantry_common::config::{ConfigLoader, GantryConfig, ConfigError};
//! use std::path::Path;
//!
//! fn main() -> Result<(), ConfigError> {
//!     let config = GantryConfig::load(Path::new("gantry.toml"))?;
//!     config.validate()?;
//!     println!("Service: {}", config.shared.service_name);
//!     Ok(())
//! }
//! ```

use crate::consts::{
    DEFAULT_BAUD, DEFAULT_IGNORE_PATTERNS, LINE_TERMINATOR, MAX_DELAY_MS, MAX_DEVICE_ID,
    POLL_INTERVAL_MS, READ_TIMEOUT_MS, REPORT_GRACE_MS, SERVICE_NAME,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found")]
    FileNotFound,

    /// TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Log level for application logging.
///
/// Uses lowercase serde values for TOML compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Most verbose, includes every wire line.
    Trace,
    /// Debug information useful during development.
    Debug,
    /// General information about rig operation.
    #[default]
    Info,
    /// Potentially problematic situations.
    Warn,
    /// Serious problems.
    Error,
}

impl LogLevel {
    /// Directive string understood by `tracing_subscriber::EnvFilter`.
    pub const fn as_filter(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

fn default_service_name() -> String {
    SERVICE_NAME.to_string()
}

/// Common configuration fields shared across all gantry binaries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedConfig {
    /// Logging verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Application instance identifier.
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            service_name: default_service_name(),
        }
    }
}

impl SharedConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if `service_name` is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.is_empty() {
            return Err(ConfigError::ValidationError(
                "service_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

// ─── Transport ──────────────────────────────────────────────────────

/// Serial transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Baud rate used when opening a physical port.
    pub baud: u32,
    /// Upper bound of one blocking line read.
    pub read_timeout_ms: u64,
    /// Appended to every write.
    pub line_terminator: String,
    /// Case-insensitive substrings; matching port descriptions are hidden.
    pub ignore_patterns: Vec<String>,
    /// Registers the in-process loopback rig.
    pub development: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            baud: DEFAULT_BAUD,
            read_timeout_ms: READ_TIMEOUT_MS,
            line_terminator: LINE_TERMINATOR.to_string(),
            ignore_patterns: DEFAULT_IGNORE_PATTERNS
                .iter()
                .map(|p| p.to_string())
                .collect(),
            development: false,
        }
    }
}

impl TransportConfig {
    #[inline]
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// True when `description` matches one of the ignore patterns.
    pub fn is_ignored(&self, description: &str) -> bool {
        let description = description.to_lowercase();
        self.ignore_patterns
            .iter()
            .filter(|p| !p.is_empty())
            .any(|p| description.contains(&p.to_lowercase()))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.baud == 0 {
            return Err(ConfigError::ValidationError(
                "transport.baud must be non-zero".to_string(),
            ));
        }
        if self.read_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "transport.read_timeout_ms must be non-zero".to_string(),
            ));
        }
        if self.line_terminator.is_empty() {
            return Err(ConfigError::ValidationError(
                "transport.line_terminator cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

// ─── Engine ─────────────────────────────────────────────────────────

/// Orchestrator timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Polling interval of every cancellable wait.
    pub poll_interval_ms: u64,
    /// Window after connect for devices to report before a query is sent.
    pub report_grace_ms: u64,
    /// Settling time before the first shutter of a job.
    pub pre_shutter_delay_ms: u64,
    /// Settling time after every shutter.
    pub post_shutter_delay_ms: u64,
    /// Cap applied to both shutter delays.
    pub max_delay_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: POLL_INTERVAL_MS,
            report_grace_ms: REPORT_GRACE_MS,
            pre_shutter_delay_ms: 0,
            post_shutter_delay_ms: 0,
            max_delay_ms: MAX_DELAY_MS,
        }
    }
}

impl EngineConfig {
    #[inline]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    #[inline]
    pub fn report_grace(&self) -> Duration {
        Duration::from_millis(self.report_grace_ms)
    }

    /// Pre-shutter delay, capped at `max_delay_ms`.
    #[inline]
    pub fn pre_shutter_delay(&self) -> Duration {
        Duration::from_millis(self.pre_shutter_delay_ms.min(self.max_delay_ms))
    }

    /// Post-shutter delay, capped at `max_delay_ms`.
    #[inline]
    pub fn post_shutter_delay(&self) -> Duration {
        Duration::from_millis(self.post_shutter_delay_ms.min(self.max_delay_ms))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "engine.poll_interval_ms must be non-zero".to_string(),
            ));
        }
        if self.max_delay_ms > MAX_DELAY_MS {
            return Err(ConfigError::ValidationError(format!(
                "engine.max_delay_ms {} exceeds limit {}",
                self.max_delay_ms, MAX_DELAY_MS
            )));
        }
        Ok(())
    }
}

// ─── Emulator ───────────────────────────────────────────────────────

/// Loopback rig emulation, active when `transport.development` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmulatorConfig {
    /// Device ids the emulated rig answers for.
    pub devices: Vec<u32>,
    /// Devices power up locked and need an unlock.
    pub start_locked: bool,
    /// Devices power up homed.
    pub start_homed: bool,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            devices: vec![1, 2],
            start_locked: false,
            start_homed: false,
        }
    }
}

impl EmulatorConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(bad) = self
            .devices
            .iter()
            .find(|&&id| id == 0 || id > MAX_DEVICE_ID)
        {
            return Err(ConfigError::ValidationError(format!(
                "emulator device id {bad} out of range 1..={MAX_DEVICE_ID}"
            )));
        }
        Ok(())
    }
}

// ─── Root ───────────────────────────────────────────────────────────

/// Complete configuration of a gantry binary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GantryConfig {
    pub shared: SharedConfig,
    pub transport: TransportConfig,
    pub engine: EngineConfig,
    pub emulator: EmulatorConfig,
}

impl GantryConfig {
    /// Validate every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;
        self.transport.validate()?;
        self.engine.validate()?;
        self.emulator.validate()
    }
}

/// Trait for loading configuration from TOML files.
///
/// # Contract
///
/// - Returns `ConfigError::FileNotFound` if the file does not exist
/// - Returns `ConfigError::ParseError` if TOML syntax is invalid
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

// Blanket implementation for all types that implement DeserializeOwned.
impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}
