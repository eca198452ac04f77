//! # Gantry Control
//!
//! Command orchestration engine for a multi-camera robotic imaging rig.
//!
//! Turns a [`Project`] (per-device poses grouped into pose sets) into a
//! sequenced, batched stream of wire commands, sends it through the
//! [`gantry_hal::PortManager`] and reconciles device state from the
//! asynchronous status reports.
//!
//! ## Architecture
//!
//! ```text
//!  caller thread            worker thread               listener thread
//!  ─────────────            ─────────────               ───────────────
//!  start_* / pause   ──►    next run                    read_line
//!  resume / cancel          wait clear-to-send ◄─────── grant when all idle
//!                           take + write ──► port ──►   apply report
//!                           camera runs                 locked? abort job
//! ```
//!
//! ## Module Structure
//!
//! - [`orchestrator`] - Public engine API and the worker loop
//! - [`listener`] - Report consumer, one thread per connection
//! - [`work`] - Work state machine, job control flags, batch construction
//! - [`handshake`] - Clear-to-send flag
//! - [`registry`] - Device registry
//! - [`events`] - Listener traits and the event hub
//! - [`host`] - Camera and activity-log collaborator traits
//! - [`project`] - Project model and TOML project files
//! - [`error`] - Engine error type

pub mod error;
pub mod events;
pub mod handshake;
pub mod host;
pub mod listener;
pub mod orchestrator;
pub mod project;
pub mod registry;
pub mod work;

pub use error::EngineError;
pub use events::{DeviceListener, EventHub, JobListener, TracingListener};
pub use host::{ActivityLog, CameraControl, Host, NoCamera, NullActivityLog};
pub use orchestrator::{Orchestrator, WorkerStats};
pub use project::{Pose, PoseSet, Project, ProjectFile};
pub use registry::DeviceRegistry;
pub use work::{WorkPhase, WorkType};
