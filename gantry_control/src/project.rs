//! Project model.
//!
//! A [`Project`] is an explicit value handed to the orchestrator; the
//! engine snapshots it when a job starts and never writes back.
//!
//! # TOML project file
//!
//! ```toml
//! devices = [1, 2]
//! homing = """
//! >1G28
//! >2G28
//! """
//! ready = [">1G0X0Y0", ">2G0X0Y0"]
//!
//! [[pose_sets]]
//! poses = [
//!     { position = ">1G0X10", payload = [">1C0"] },
//!     { position = ">2G0X20", payload = [">2E0S1"] },
//! ]
//! ```

use gantry_common::config::ConfigError;
use gantry_common::protocol::{Action, ProtocolError, deserialize};
use serde::Deserialize;

/// One device position plus what to do there.
#[derive(Debug, Clone, PartialEq)]
pub struct Pose {
    pub position: Action,
    pub payload: Vec<Action>,
}

impl Pose {
    pub fn new(position: Action, payload: Vec<Action>) -> Self {
        Self { position, payload }
    }

    #[inline]
    pub fn device(&self) -> u32 {
        self.position.device()
    }
}

/// Poses imaged together. A device may appear more than once; its poses
/// then form that device's sequence within the set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PoseSet {
    pub poses: Vec<Pose>,
}

impl PoseSet {
    pub fn new(poses: Vec<Pose>) -> Self {
        Self { poses }
    }

    /// Distinct devices in first-appearance order.
    pub fn devices(&self) -> Vec<u32> {
        let mut devices = Vec::new();
        for pose in &self.poses {
            if !devices.contains(&pose.device()) {
                devices.push(pose.device());
            }
        }
        devices
    }
}

/// Everything a job needs to know about the rig and the capture.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Project {
    pub devices: Vec<u32>,
    /// Wire text, one command per line.
    pub homing_sequence: String,
    pub pose_sets: Vec<PoseSet>,
    pub ready_positions: Vec<Action>,
}

impl Project {
    /// Project with devices only.
    pub fn with_devices(devices: impl Into<Vec<u32>>) -> Self {
        Self {
            devices: devices.into(),
            ..Self::default()
        }
    }
}

// ─── File format ────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
struct PoseEntry {
    position: String,
    #[serde(default)]
    payload: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct PoseSetEntry {
    #[serde(default)]
    poses: Vec<PoseEntry>,
}

/// Serialized project, loaded with
/// [`ConfigLoader`](gantry_common::config::ConfigLoader).
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectFile {
    devices: Vec<u32>,
    #[serde(default)]
    homing: String,
    #[serde(default)]
    ready: Vec<String>,
    #[serde(default)]
    pose_sets: Vec<PoseSetEntry>,
}

fn parse_all(lines: &[String]) -> Result<Vec<Action>, ProtocolError> {
    lines.iter().map(|l| deserialize(l)).collect()
}

impl ProjectFile {
    /// Parse every command line; any malformed line rejects the file.
    pub fn into_project(self) -> Result<Project, ConfigError> {
        let invalid = |e: ProtocolError| ConfigError::ValidationError(e.to_string());

        let mut pose_sets = Vec::with_capacity(self.pose_sets.len());
        for set in &self.pose_sets {
            let mut poses = Vec::with_capacity(set.poses.len());
            for entry in &set.poses {
                let position = deserialize(&entry.position).map_err(invalid)?;
                if position.is_none() {
                    return Err(ConfigError::ValidationError(
                        "pose position cannot be empty".to_string(),
                    ));
                }
                poses.push(Pose::new(position, parse_all(&entry.payload).map_err(invalid)?));
            }
            pose_sets.push(PoseSet::new(poses));
        }

        Ok(Project {
            devices: self.devices,
            homing_sequence: self.homing,
            pose_sets,
            ready_positions: parse_all(&self.ready).map_err(invalid)?,
        })
    }
}
