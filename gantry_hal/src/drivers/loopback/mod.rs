//! Loopback port backed by an in-process rig emulator.
//!
//! Registered as `loopback` when `transport.development` is set, so the
//! whole engine can be exercised without hardware.

mod driver;
mod emulator;

pub use driver::LoopbackDriver;
pub use emulator::{BANNER, EmulatedGantry, RigEmulator};
