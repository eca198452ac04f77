//! Clear-to-send handshake.
//!
//! A single flag: granted by the listener once the rig is ready for more
//! input, consumed by the worker for every serial write.
//!
//! ```text
//!   listener: report ──► all idle? ──► grant ─┐
//!                                             ▼
//!   worker:   wait ──► take ──► mark writing ──► write
//! ```
//!
//! Taking, marking and writing happen under the flag's lock, and the
//! listener evaluates its grant condition under the same lock, so a report
//! that arrives mid-write can never re-grant the flag for that write.

use parking_lot::{Condvar, Mutex};
use std::time::Duration;

#[derive(Default)]
pub struct ClearToSend {
    clear: Mutex<bool>,
    changed: Condvar,
}

impl ClearToSend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(&self) {
        *self.clear.lock() = true;
        self.changed.notify_all();
    }

    /// Grant when `ready` holds, evaluated under the flag lock.
    pub fn grant_if(&self, ready: impl FnOnce() -> bool) -> bool {
        let mut clear = self.clear.lock();
        if !*clear && ready() {
            *clear = true;
            self.changed.notify_all();
        }
        *clear
    }

    pub fn revoke(&self) {
        *self.clear.lock() = false;
    }

    #[inline]
    pub fn is_clear(&self) -> bool {
        *self.clear.lock()
    }

    /// Wait for the flag, take it and run `send` while holding the lock.
    ///
    /// Returns `None` once `keep_going` turns false. If `send` reports
    /// failure the flag is restored.
    pub fn wait_and_take(
        &self,
        poll: Duration,
        keep_going: impl Fn() -> bool,
        send: impl FnOnce() -> bool,
    ) -> Option<bool> {
        let mut clear = self.clear.lock();
        loop {
            if !keep_going() {
                return None;
            }
            if *clear {
                *clear = false;
                let sent = send();
                if !sent {
                    *clear = true;
                }
                return Some(sent);
            }
            self.changed.wait_for(&mut clear, poll);
        }
    }

    /// Wait for the flag without taking it.
    ///
    /// Returns `false` once `keep_going` turns false.
    pub fn wait_clear(&self, poll: Duration, keep_going: impl Fn() -> bool) -> bool {
        let mut clear = self.clear.lock();
        loop {
            if !keep_going() {
                return false;
            }
            if *clear {
                return true;
            }
            self.changed.wait_for(&mut clear, poll);
        }
    }
}
