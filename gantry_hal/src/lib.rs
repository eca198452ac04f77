//! # Gantry HAL Library
//!
//! Port and transport layer with a pluggable driver architecture.
//!
//! Drivers implement the [`PortDriver`] trait and hand out a [`Link`]: a
//! line reader and a line writer that can be used from different threads.
//! The [`PortManager`] owns the single active link.
//!
//! # Module Structure
//!
//! - [`transport`] - `PortDriver` trait, link halves, line framing, errors
//! - [`driver_registry`] - Named driver registration
//! - [`port_manager`] - Enumeration, selection, open/close, read/write
//! - [`drivers`] - Serial and loopback driver implementations
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                      gantry_hal (single crate)                   │
//! │  ┌──────────────┐    ┌──────────────┐    ┌─────────────────────┐ │
//! │  │  listener    │◄───│ PortManager  │◄──►│  Driver Registry    │ │
//! │  │  worker      │───►│ (one link)   │    │                     │ │
//! │  └──────────────┘    └──────┬───────┘    └─────────────────────┘ │
//! │                             │                                    │
//! │                             ▼                                    │
//! │                   ┌──────────────────┐                           │
//! │                   │  PortDriver      │ (serial, loopback, ...)   │
//! │                   └──────────────────┘                           │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

pub mod driver_registry;
pub mod drivers;
pub mod port_manager;
pub mod transport;

// Re-export key types for convenience
pub use crate::driver_registry::DriverRegistry;
pub use crate::port_manager::PortManager;
pub use crate::transport::{
    LineFramer, LineReader, LineWriter, Link, PortDescriptor, PortDriver, PortKind,
    TransportError,
};
