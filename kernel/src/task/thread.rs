//! Thread control block.
//!
//! Everything the scheduler needs to manage one kernel thread: identity,
//! status, base priority, the exponentially-smoothed burst prediction, and
//! the wait/run tick accounting that drives aging.

use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonically increasing thread-id counter.
static NEXT_TID: AtomicU64 = AtomicU64::new(0);

/// Allocate a unique thread id.
fn alloc_tid() -> u64 {
    NEXT_TID.fetch_add(1, Ordering::Relaxed)
}

/// Highest legal base priority.
pub const PRIORITY_MAX: u32 = 149;

/// Accumulated waiting ticks that earn one priority boost.
pub const AGING_THRESHOLD: u64 = 1500;

/// Priority added per whole [`AGING_THRESHOLD`] of accumulated wait.
pub const AGING_BOOST: u32 = 10;

/// The possible states of a thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadStatus {
    /// Allocated but never scheduled.
    JustCreated,
    /// In a ready queue, waiting for the CPU.
    Ready,
    /// Currently on the CPU.
    Running,
    /// Waiting for simulated I/O or an event.
    Blocked,
    /// Done; awaiting deferred destruction.
    Finished,
}

/// Saved user-mode machine state for a thread that owns an address space.
///
/// The simulation has no real registers to spill; the type exists so the
/// dispatcher's save/restore points are visible and testable.
#[derive(Debug, Default)]
pub struct UserSpace {
    saves: u32,
    restores: u32,
}

impl UserSpace {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn save_state(&mut self) {
        self.saves += 1;
    }

    pub(crate) fn restore_state(&mut self) {
        self.restores += 1;
    }

    /// How many save/restore pairs the dispatcher has performed.
    pub fn state_transitions(&self) -> (u32, u32) {
        (self.saves, self.restores)
    }
}

/// A thread control block.
pub struct Thread {
    id: u64,
    name: String,
    status: ThreadStatus,
    priority: u32,
    remaining_burst: f64,
    start_of_wait: u64,
    accumulated_wait: u64,
    queued_since: u64,
    start_of_run: u64,
    last_executed: u64,
    user_space: Option<UserSpace>,
}

impl Thread {
    /// Create a thread in the JustCreated state.
    ///
    /// # Panics
    /// If `priority` exceeds [`PRIORITY_MAX`].
    pub fn new(name: &str, priority: u32, remaining_burst: f64) -> Self {
        assert!(priority <= PRIORITY_MAX, "thread priority {priority} out of range");
        assert!(remaining_burst >= 0.0, "negative burst prediction");
        Self {
            id: alloc_tid(),
            name: String::from(name),
            status: ThreadStatus::JustCreated,
            priority,
            remaining_burst,
            start_of_wait: 0,
            accumulated_wait: 0,
            queued_since: 0,
            start_of_run: 0,
            last_executed: 0,
            user_space: None,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> ThreadStatus {
        self.status
    }

    pub(crate) fn set_status(&mut self, status: ThreadStatus) {
        if status == ThreadStatus::Finished {
            assert!(
                self.status != ThreadStatus::Finished,
                "thread {} finished twice",
                self.id
            );
        }
        self.status = status;
    }

    pub fn priority(&self) -> u32 {
        self.priority
    }

    /// Explicit priority setter (the only mutation besides aging).
    pub fn set_priority(&mut self, priority: u32) {
        assert!(priority <= PRIORITY_MAX, "thread priority {priority} out of range");
        self.priority = priority;
    }

    pub fn remaining_burst(&self) -> f64 {
        self.remaining_burst
    }

    /// Tick at which the thread last started waiting in a ready queue.
    pub fn start_of_wait(&self) -> u64 {
        self.start_of_wait
    }

    pub fn accumulated_wait(&self) -> u64 {
        self.accumulated_wait
    }

    /// Tick at which the thread was admitted to its ready queue. Unlike
    /// `start_of_wait`, aging passes do not move this forward.
    pub fn queued_since(&self) -> u64 {
        self.queued_since
    }

    /// Tick at which the thread last took the CPU.
    pub fn start_of_run(&self) -> u64 {
        self.start_of_run
    }

    /// Executed ticks recorded at the last dispatch boundary.
    pub fn last_executed(&self) -> u64 {
        self.last_executed
    }

    pub fn user_space(&self) -> Option<&UserSpace> {
        self.user_space.as_ref()
    }

    pub(crate) fn user_space_mut(&mut self) -> Option<&mut UserSpace> {
        self.user_space.as_mut()
    }

    /// Attach a user address space; the dispatcher will save/restore its
    /// state around context switches.
    pub fn set_user_space(&mut self, space: UserSpace) {
        self.user_space = Some(space);
    }

    /// Begin a fresh waiting interval at `now` (on queue admission).
    pub(crate) fn reset_wait(&mut self, now: u64) {
        self.start_of_wait = now;
        self.accumulated_wait = 0;
        self.queued_since = now;
    }

    /// Fold the wait since `start_of_wait` into the accumulated total.
    pub(crate) fn record_wait(&mut self, now: u64) {
        self.accumulated_wait += now.saturating_sub(self.start_of_wait);
        self.start_of_wait = now;
    }

    /// Apply one priority boost per whole [`AGING_THRESHOLD`] of
    /// accumulated wait, clamped at [`PRIORITY_MAX`].
    ///
    /// Returns `Some((old, new))` when the priority actually changed.
    pub(crate) fn boost_priority(&mut self) -> Option<(u32, u32)> {
        let old = self.priority;
        while self.accumulated_wait >= AGING_THRESHOLD {
            self.accumulated_wait -= AGING_THRESHOLD;
            self.priority = (self.priority + AGING_BOOST).min(PRIORITY_MAX);
        }
        (self.priority != old).then_some((old, self.priority))
    }

    /// Mark the thread as taking the CPU at `now`.
    pub(crate) fn note_dispatch(&mut self, now: u64) {
        self.start_of_run = now;
    }

    /// Record the executed-tick delta for the quantum ending at `now` and
    /// fold it into the smoothed burst prediction. Returns the delta.
    pub(crate) fn fold_burst(&mut self, now: u64) -> u64 {
        let observed = now.saturating_sub(self.start_of_run);
        self.last_executed = observed;
        self.remaining_burst = 0.5 * observed as f64 + 0.5 * self.remaining_burst;
        observed
    }
}
