//! External collaborators.
//!
//! The engine talks to the camera SDK and to the activity log only through
//! these traits. Both have no-op implementations for headless use.
//!
//! # Camera command mapping
//!
//! | Code | Call                                  |
//! |------|---------------------------------------|
//! | E10  | `connect(device)`                     |
//! | E0   | `take_picture(device, S == 1)`        |
//! | E1   | `focus(device, S seconds)`            |

use gantry_common::consts::MAX_DELAY_MS;
use gantry_common::protocol::{Action, Axis, Code};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Camera SDK seam.
pub trait CameraControl: Send + Sync {
    /// Returns `false` when the camera could not be reached.
    fn connect(&self, device: u32) -> bool;

    fn take_picture(&self, device: u32, autofocus: bool);

    fn focus(&self, device: u32, hold: Duration);
}

/// Activity log seam, one record per device per pose set.
pub trait ActivityLog: Send + Sync {
    /// Open a record, returning its id.
    fn start_pose(&self, device: u32, source: &str, session_id: u64) -> u64;

    /// Close the open record of `device`, if any.
    fn end_pose(&self, device: u32) -> Option<u64>;
}

/// Camera stand-in that only logs.
pub struct NoCamera;

impl CameraControl for NoCamera {
    fn connect(&self, device: u32) -> bool {
        debug!("No camera: connect {}", device);
        true
    }

    fn take_picture(&self, device: u32, autofocus: bool) {
        debug!("No camera: picture on {} (autofocus {})", device, autofocus);
    }

    fn focus(&self, device: u32, hold: Duration) {
        debug!("No camera: focus {} for {:?}", device, hold);
    }
}

/// Activity log that records nothing.
pub struct NullActivityLog;

impl ActivityLog for NullActivityLog {
    fn start_pose(&self, _device: u32, _source: &str, _session_id: u64) -> u64 {
        0
    }

    fn end_pose(&self, _device: u32) -> Option<u64> {
        None
    }
}

/// Collaborators handed to the orchestrator.
#[derive(Clone)]
pub struct Host {
    pub camera: Arc<dyn CameraControl>,
    pub activity: Arc<dyn ActivityLog>,
    /// Written into every activity record.
    pub session_id: u64,
}

impl Default for Host {
    fn default() -> Self {
        Self {
            camera: Arc::new(NoCamera),
            activity: Arc::new(NullActivityLog),
            session_id: 0,
        }
    }
}

impl Host {
    /// Run one camera action against `device`.
    pub(crate) fn dispatch_camera(&self, action: &Action, device: u32) {
        let s = action.args().get(Axis::S);
        match action.code() {
            Code::E10 => {
                if !self.camera.connect(device) {
                    warn!("Camera {} did not connect", device);
                }
            }
            Code::E0 => self
                .camera
                .take_picture(device, s.is_some_and(|v| v == 1.0)),
            Code::E1 => {
                let seconds = s.unwrap_or(0.0);
                let hold = if seconds > 0.0 {
                    Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX)
                } else {
                    Duration::ZERO
                };
                let limit = Duration::from_millis(MAX_DELAY_MS);
                if hold > limit {
                    warn!("Focus hold of {}s on camera {} clamped to {:?}", seconds, device, limit);
                }
                self.camera.focus(device, hold.min(limit));
            }
            other => warn!("{} is not a camera command", other),
        }
    }
}
