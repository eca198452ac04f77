//! Batch construction.
//!
//! A batch is an ordered list of packets; each packet is one multi-device
//! write unit. Layout:
//!
//! ```text
//!   header   G90 for every device not yet confirmed absolute
//!   body     job specific (see below), `offsets` marks its range
//!   footer   M18 for every device (all jobs except jogging)
//! ```
//!
//! Imaging body: for each pose set, the per-device pose sequences are
//! zipped into rows; a row becomes one packet holding every present
//! device's position first, then their payloads, tagged with the pose-set
//! index. Homing and set-ready bodies are chunked by the number of distinct
//! devices they address.

use super::WorkType;
use crate::project::{Pose, Project};
use gantry_common::device::Device;
use gantry_common::protocol::{Action, Code, Destination, deserialize_sequence, serialize_all};
use tracing::warn;

/// Contiguous same-destination slice of a packet.
#[derive(Debug, Clone, PartialEq)]
pub struct Run {
    pub destination: Destination,
    pub actions: Vec<Action>,
}

impl Run {
    pub fn has_shutter(&self) -> bool {
        self.actions.iter().any(|a| a.code().is_shutter())
    }

    /// Wire payload without terminator.
    pub fn payload(&self) -> String {
        serialize_all(&self.actions)
    }
}

/// One write unit.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Packet {
    pub actions: Vec<Action>,
    /// Pose set this packet images.
    pub pose_set: Option<usize>,
}

impl Packet {
    pub fn new(actions: Vec<Action>) -> Self {
        Self {
            actions,
            pose_set: None,
        }
    }

    pub fn tagged(actions: Vec<Action>, pose_set: usize) -> Self {
        Self {
            actions,
            pose_set: Some(pose_set),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Split into contiguous same-destination runs.
    pub fn runs(&self) -> Vec<Run> {
        let mut runs: Vec<Run> = Vec::new();
        for action in &self.actions {
            match runs.last_mut() {
                Some(run) if run.destination == action.destination() => {
                    run.actions.push(action.clone())
                }
                _ => runs.push(Run {
                    destination: action.destination(),
                    actions: vec![action.clone()],
                }),
            }
        }
        runs
    }
}

/// Built batch.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Batch {
    pub packets: Vec<Packet>,
    /// Index range `[start, end)` of the body within `packets`.
    pub offsets: Option<(usize, usize)>,
}

impl Batch {
    #[inline]
    pub fn body_len(&self) -> usize {
        self.offsets.map_or(0, |(start, end)| end - start)
    }

    /// Devices addressed by the body, broadcast `0` included as-is.
    pub fn body_addresses(&self) -> Vec<u32> {
        let body: &[Packet] = match self.offsets {
            Some((start, end)) => &self.packets[start..end],
            None => &[],
        };
        let actions: Vec<Action> = body.iter().flat_map(|p| p.actions.clone()).collect();
        distinct_devices(&actions)
    }
}

fn distinct_devices(actions: &[Action]) -> Vec<u32> {
    let mut devices = Vec::new();
    for action in actions {
        if !devices.contains(&action.device()) {
            devices.push(action.device());
        }
    }
    devices
}

fn strip_none(actions: impl IntoIterator<Item = Action>) -> Vec<Action> {
    actions.into_iter().filter(|a| !a.is_none()).collect()
}

/// Chunk by the number of distinct devices addressed.
fn chunked(actions: Vec<Action>) -> Vec<Packet> {
    let width = distinct_devices(&actions).len().max(1);
    actions
        .chunks(width)
        .map(|chunk| Packet::new(chunk.to_vec()))
        .collect()
}

/// Builds batches from a device snapshot.
pub struct BatchBuilder<'a> {
    devices: &'a [Device],
}

impl<'a> BatchBuilder<'a> {
    pub fn new(devices: &'a [Device]) -> Self {
        Self { devices }
    }

    fn header(&self) -> Option<Packet> {
        let actions: Vec<Action> = self
            .devices
            .iter()
            .filter(|d| !d.is_absolute)
            .map(|d| Action::absolute(d.id))
            .collect();
        (!actions.is_empty()).then(|| Packet::new(actions))
    }

    fn footer(&self) -> Option<Packet> {
        let actions: Vec<Action> = self
            .devices
            .iter()
            .map(|d| Action::disengage(d.id))
            .collect();
        (!actions.is_empty()).then(|| Packet::new(actions))
    }

    fn imaging_body(&self, project: &Project) -> Vec<Packet> {
        let mut packets = Vec::new();
        for (index, set) in project.pose_sets.iter().enumerate() {
            let sequences: Vec<Vec<&Pose>> = set
                .devices()
                .into_iter()
                .map(|id| set.poses.iter().filter(|p| p.device() == id).collect())
                .collect();
            let rows = sequences.iter().map(Vec::len).max().unwrap_or(0);

            for row in 0..rows {
                let present: Vec<&Pose> =
                    sequences.iter().filter_map(|s| s.get(row).copied()).collect();
                let positions = present.iter().map(|p| p.position.clone());
                let payloads = present.iter().flat_map(|p| p.payload.iter().cloned());
                let actions = strip_none(positions.chain(payloads));
                if !actions.is_empty() {
                    packets.push(Packet::tagged(actions, index));
                }
            }
        }
        packets
    }

    fn homing_body(&self, project: &Project) -> Vec<Packet> {
        let (actions, errors) = deserialize_sequence(&project.homing_sequence);
        for e in &errors {
            warn!("Skipping homing line: {}", e);
        }
        let mut actions = strip_none(actions);
        if actions.is_empty() {
            actions = self
                .devices
                .iter()
                .map(|d| Action::new(Code::G28, d.id))
                .collect();
        }
        chunked(actions)
    }

    /// Build the batch for `kind`. `jog` is only read for jogging.
    pub fn build(&self, kind: WorkType, project: &Project, jog: &[Action]) -> Batch {
        let body = match kind {
            WorkType::Imaging => self.imaging_body(project),
            WorkType::Homing => self.homing_body(project),
            WorkType::SetReady => chunked(strip_none(project.ready_positions.iter().cloned())),
            WorkType::Jogging => {
                let actions = strip_none(jog.iter().cloned());
                if actions.is_empty() {
                    Vec::new()
                } else {
                    vec![Packet::new(actions)]
                }
            }
        };
        if body.is_empty() {
            return Batch::default();
        }

        let mut packets: Vec<Packet> = self.header().into_iter().collect();
        let start = packets.len();
        packets.extend(body);
        let end = packets.len();
        if kind.has_footer() {
            packets.extend(self.footer());
        }
        Batch {
            packets,
            offsets: Some((start, end)),
        }
    }
}
