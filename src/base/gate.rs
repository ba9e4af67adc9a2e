//! Pause/resume/stop gate shared by all workers.

use std::time::Duration;

use parking_lot::{Condvar, Mutex};

#[derive(Debug, Default)]
struct GateState {
    paused: bool,
    stopped: bool,
}

/// A single lock + condition controlling the whole engine.
///
/// Long-running workers call [`RunGate::wait_if_paused`] at safe points;
/// the call blocks while the engine is paused and returns `false` once
/// the engine has been stopped, at which point the worker aborts cleanly.
#[derive(Debug, Default)]
pub struct RunGate {
    state: Mutex<GateState>,
    cond: Condvar,
}

impl RunGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pause(&self) {
        self.state.lock().paused = true;
    }

    pub fn resume(&self) {
        let mut state = self.state.lock();
        state.paused = false;
        self.cond.notify_all();
    }

    /// Stop the engine. Wakes every worker blocked on the pause lock.
    pub fn stop(&self) {
        let mut state = self.state.lock();
        state.stopped = true;
        state.paused = false;
        self.cond.notify_all();
    }

    pub fn is_paused(&self) -> bool {
        self.state.lock().paused
    }

    pub fn is_running(&self) -> bool {
        !self.state.lock().stopped
    }

    /// Block while paused. Returns `true` to continue, `false` once the
    /// engine has stopped.
    pub fn wait_if_paused(&self) -> bool {
        let mut state = self.state.lock();
        while state.paused && !state.stopped {
            self.cond.wait(&mut state);
        }
        !state.stopped
    }

    /// Like [`wait_if_paused`](Self::wait_if_paused) but gives up after
    /// `timeout`, returning `false`.
    pub fn wait_if_paused_timeout(&self, timeout: Duration) -> bool {
        let mut state = self.state.lock();
        if state.paused && !state.stopped {
            self.cond.wait_for(&mut state, timeout);
        }
        !state.stopped && !state.paused
    }
}
