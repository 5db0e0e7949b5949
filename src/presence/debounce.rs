//! Single-slot coalescing timer.
//!
//! At most one fire is scheduled at a time. Arming while a fire is pending
//! does nothing, so the delay is measured from the first trigger and never
//! extended. Each armed fire carries an epoch; a fire whose epoch is no
//! longer current (cancelled or superseded) must not run.

use tokio::task::JoinHandle;

#[derive(Debug)]
enum TimerState {
    Idle,
    Pending { epoch: u64, task: JoinHandle<()> },
}

#[derive(Debug)]
pub struct DebounceTimer {
    state: TimerState,
    next_epoch: u64,
}

impl DebounceTimer {
    pub fn new() -> Self {
        Self {
            state: TimerState::Idle,
            next_epoch: 0,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.state, TimerState::Pending { .. })
    }

    /// Arm the timer if idle.
    ///
    /// `spawn` receives the epoch of the new fire and returns its task.
    /// Returns false without calling `spawn` when a fire is already pending.
    pub fn arm<F>(&mut self, spawn: F) -> bool
    where
        F: FnOnce(u64) -> JoinHandle<()>,
    {
        if self.is_pending() {
            return false;
        }

        let epoch = self.next_epoch;
        self.next_epoch = self.next_epoch.wrapping_add(1);
        self.state = TimerState::Pending {
            epoch,
            task: spawn(epoch),
        };
        true
    }

    /// Claim the pending fire from inside its own task.
    ///
    /// Returns true and goes Idle if `epoch` is the pending one. Returns false
    /// for stale fires, leaving the state untouched.
    pub fn settle(&mut self, epoch: u64) -> bool {
        match &self.state {
            TimerState::Pending { epoch: pending, .. } if *pending == epoch => {
                // Dropping the handle detaches the running task
                self.state = TimerState::Idle;
                true
            }
            _ => false,
        }
    }

    /// Cancel a pending fire. Returns true if one was pending.
    pub fn cancel(&mut self) -> bool {
        match std::mem::replace(&mut self.state, TimerState::Idle) {
            TimerState::Pending { task, .. } => {
                task.abort();
                true
            }
            TimerState::Idle => false,
        }
    }
}

impl Default for DebounceTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for DebounceTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
