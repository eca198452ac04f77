//! Engine error type.
//!
//! Precondition failures are returned synchronously and leave engine state
//! untouched. Transport faults inside the worker never surface here; they
//! are logged and end the job through the fault path.

use crate::work::WorkType;
use gantry_hal::TransportError;
use thiserror::Error;

/// Errors returned by [`Orchestrator`](crate::Orchestrator) operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A job is working or paused.
    #[error("A job is already in progress")]
    Busy,

    /// No open connection.
    #[error("Not connected")]
    NotConnected,

    /// `pause` without a working job.
    #[error("No job is running")]
    NotRunning,

    /// `resume` without a paused job.
    #[error("No job is paused")]
    NotPaused,

    /// Jogging and set-ready require homed devices.
    #[error("Devices not homed: {0:?}")]
    NotHomed(Vec<u32>),

    /// Nothing to do for this job.
    #[error("Nothing to send for {0} job")]
    EmptyBatch(WorkType),

    /// A serial write reported failure.
    #[error("Write failed: {0:?}")]
    WriteFailed(String),

    /// Worker or listener thread could not be spawned.
    #[error("Failed to spawn {0} thread: {1}")]
    Spawn(&'static str, std::io::Error),

    #[error(transparent)]
    Transport(#[from] TransportError),
}
