//! Port driver implementations.
//!
//! - [`serial`] - Physical serial ports via the `serialport` crate
//! - [`loopback`] - In-process emulated rig for development and testing
//!
//! # Adding New Drivers
//!
//! 1. Create a new submodule under `drivers/`
//! 2. Implement the `PortDriver` trait from [`crate::transport`]
//! 3. Register an instance with `PortManager::register`

pub mod loopback;
pub mod serial;
