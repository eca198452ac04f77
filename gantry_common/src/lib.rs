//! Gantry Common Library
//!
//! Shared types for every crate of the gantry workspace: the action model
//! and its wire codec, the device status model, configuration loading and
//! system-wide constants.
//!
//! # Module Structure
//!
//! - [`protocol`] - Actions, command codec and response parser
//! - [`device`] - Per-gantry status model
//! - [`config`] - Configuration loading traits and types
//! - [`consts`] - Numeric limits and defaults
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use gantry_common::prelude::*;
//!
//! let action = Action::new(Code::G0, 1).with(Axis::X, 10.0);
//! assert_eq!(serialize(&action), ">1G0X10");
//! ```

pub mod config;
pub mod consts;
pub mod device;
pub mod prelude;
pub mod protocol;
