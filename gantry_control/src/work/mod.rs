//! Work episodes: state machine, control flags and batch construction.
//!
//! ```text
//!            Start(kind)          Pause
//!   Idle ───────────────► Working ──────► Paused
//!    ▲                     │  ▲             │
//!    │   Finish/Cancel/    │  └── Resume ───┘
//!    └──── Fault ──────────┘◄── Cancel/Fault ┘
//! ```

pub mod batch;

pub use batch::{Batch, BatchBuilder, Packet, Run};

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

/// Kind of job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkType {
    Imaging,
    Homing,
    Jogging,
    SetReady,
}

impl WorkType {
    /// Footer disengages motors after every job except jogging.
    #[inline]
    pub const fn has_footer(self) -> bool {
        !matches!(self, Self::Jogging)
    }

    /// Jobs that move to absolute targets need a homed rig.
    #[inline]
    pub const fn requires_homed(self) -> bool {
        matches!(self, Self::Jogging | Self::SetReady)
    }
}

impl fmt::Display for WorkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Imaging => "IMAGING",
            Self::Homing => "HOMING",
            Self::Jogging => "JOGGING",
            Self::SetReady => "SET_READY",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkPhase {
    Idle,
    Working,
    Paused,
}

/// Event that can trigger a phase transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkEvent {
    Start(WorkType),
    Pause,
    Resume,
    /// Batch exhausted and acknowledged.
    Finish,
    Cancel,
    /// Machine or transport fault.
    Fault,
}

/// Result of a transition attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionResult {
    Ok(WorkPhase),
    Rejected(&'static str),
}

/// Phase plus the type of the active job.
#[derive(Debug, Clone)]
pub struct WorkStateMachine {
    phase: WorkPhase,
    work_type: Option<WorkType>,
}

impl Default for WorkStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkStateMachine {
    pub const fn new() -> Self {
        Self {
            phase: WorkPhase::Idle,
            work_type: None,
        }
    }

    #[inline]
    pub const fn phase(&self) -> WorkPhase {
        self.phase
    }

    /// Type of the working or paused job.
    #[inline]
    pub const fn work_type(&self) -> Option<WorkType> {
        self.work_type
    }

    #[inline]
    pub const fn is_active(&self) -> bool {
        !matches!(self.phase, WorkPhase::Idle)
    }

    pub fn handle_event(&mut self, event: WorkEvent) -> TransitionResult {
        use WorkEvent::*;
        use WorkPhase::*;

        let next = match (self.phase, event) {
            (Idle, Start(kind)) => {
                self.work_type = Some(kind);
                Working
            }
            (Working, Pause) => Paused,
            (Paused, Resume) => Working,
            (Working, Finish) => Idle,
            (Working | Paused, Cancel | Fault) => Idle,
            _ => return TransitionResult::Rejected(invalid_transition_reason(self.phase, event)),
        };

        if next == Idle {
            self.work_type = None;
        }
        self.phase = next;
        TransitionResult::Ok(next)
    }
}

fn invalid_transition_reason(phase: WorkPhase, event: WorkEvent) -> &'static str {
    use WorkEvent::*;
    use WorkPhase::*;
    match (phase, event) {
        (Working | Paused, Start(_)) => "a job is already in progress",
        (Idle, _) => "no job is active",
        (Paused, Pause) => "job is already paused",
        (Working, Resume) => "job is not paused",
        (Paused, Finish) => "paused job cannot finish",
        _ => "invalid event for current phase",
    }
}

// ─── Job control ────────────────────────────────────────────────────

/// Cooperative cancellation flags shared with the worker and listener.
#[derive(Debug, Default)]
pub struct JobControl {
    keep_working: AtomicBool,
    paused: AtomicBool,
    aborted: AtomicBool,
    fault: Mutex<Option<String>>,
}

impl JobControl {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm for a new or resumed episode.
    pub fn arm(&self) {
        self.paused.store(false, Ordering::SeqCst);
        self.keep_working.store(true, Ordering::SeqCst);
    }

    /// Arm for a fresh job: also clears the fault latch.
    pub fn arm_new_job(&self) {
        self.aborted.store(false, Ordering::SeqCst);
        *self.fault.lock() = None;
        self.arm();
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
        self.keep_working.store(false, Ordering::SeqCst);
    }

    pub fn stop(&self) {
        self.keep_working.store(false, Ordering::SeqCst);
    }

    /// Stop with a fault. Returns `true` only for the first abort of a job.
    pub fn abort(&self, reason: impl Into<String>) -> bool {
        if self.aborted.swap(true, Ordering::SeqCst) {
            return false;
        }
        *self.fault.lock() = Some(reason.into());
        self.keep_working.store(false, Ordering::SeqCst);
        true
    }

    /// Fault reason, handed out once.
    pub fn take_fault(&self) -> Option<String> {
        self.fault.lock().take()
    }

    #[inline]
    pub fn keep_working(&self) -> bool {
        self.keep_working.load(Ordering::SeqCst)
    }

    #[inline]
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }
}

// ─── Tests ──────────────────────────────────────────────────────────
