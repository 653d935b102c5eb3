//! Multilevel feedback queue scheduler.
//!
//! Three ready queues with three selection policies, plus the dispatcher
//! and the deferred-destruction slot for finishing threads:
//!
//!   L1: priority >= 100 — shortest remaining burst first (preemptive)
//!   L2: 50..=99         — highest priority first (non-preemptive)
//!   L3: < 50            — round-robin FIFO
//!
//! Waiting threads age: every pass over the queues folds waiting time into
//! each thread and promotes threads whose priority has crossed a band
//! boundary.
//!
//! These routines assume that interrupts are already disabled; on the
//! single simulated processor that is the only mutual exclusion needed.
//! Locks are off limits here — blocking on one would re-enter the
//! scheduler.

use std::collections::VecDeque;

use machine::Machine;

use crate::task::thread::{Thread, ThreadStatus};

/// Ticks between aging passes (one preemption boundary per period).
pub const AGING_PERIOD: u64 = 100;

/// Which ready queue a priority belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueLevel {
    L1,
    L2,
    L3,
}

impl QueueLevel {
    pub fn for_priority(priority: u32) -> Self {
        if priority >= 100 {
            QueueLevel::L1
        } else if priority >= 50 {
            QueueLevel::L2
        } else {
            QueueLevel::L3
        }
    }

    /// Queue number as printed in the trace lines.
    pub fn number(self) -> u8 {
        match self {
            QueueLevel::L1 => 1,
            QueueLevel::L2 => 2,
            QueueLevel::L3 => 3,
        }
    }
}

/// The scheduler: ready queues, the running thread, and the single-slot
/// sink for deferred destruction.
pub struct Scheduler {
    l1: VecDeque<Thread>,
    l2: VecDeque<Thread>,
    l3: VecDeque<Thread>,
    current: Option<Thread>,
    to_be_destroyed: Option<Thread>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            l1: VecDeque::new(),
            l2: VecDeque::new(),
            l3: VecDeque::new(),
            current: None,
            to_be_destroyed: None,
        }
    }

    fn queue_mut(&mut self, level: QueueLevel) -> &mut VecDeque<Thread> {
        match level {
            QueueLevel::L1 => &mut self.l1,
            QueueLevel::L2 => &mut self.l2,
            QueueLevel::L3 => &mut self.l3,
        }
    }

    // ── The running thread ──────────────────────────────────────────

    pub fn current(&self) -> Option<&Thread> {
        self.current.as_ref()
    }

    pub(crate) fn current_mut(&mut self) -> Option<&mut Thread> {
        self.current.as_mut()
    }

    /// Install the initial running thread (used once, at boot).
    pub fn set_current(&mut self, mut thread: Thread) {
        assert!(self.current.is_none(), "scheduler: current thread already set");
        thread.set_status(ThreadStatus::Running);
        self.current = Some(thread);
    }

    /// Remove the running thread from the CPU without dispatching a
    /// successor (shutdown and idle paths).
    pub(crate) fn detach_current(&mut self) -> Option<Thread> {
        self.current.take()
    }

    // ── ReadyQueueSet ───────────────────────────────────────────────

    /// Mark a thread ready and append it to the queue matching its
    /// current priority. Resets the thread's waiting accounting.
    pub fn admit(&mut self, mut thread: Thread, m: &Machine) {
        assert!(m.interrupt.is_off(), "scheduler: admit with interrupts enabled");
        let now = m.clock.ticks();
        thread.set_status(ThreadStatus::Ready);
        thread.reset_wait(now);
        let level = QueueLevel::for_priority(thread.priority());
        log_inserted(now, thread.id(), level);
        self.queue_mut(level).push_back(thread);
    }

    /// Remove and return the next thread to run, or `None` if every queue
    /// is empty.
    ///
    /// L1 is scanned for the minimum remaining burst, L2 for the maximum
    /// priority — both with earliest-inserted-wins ties (the running
    /// comparison is strict, so an equal later entry never displaces an
    /// earlier one). L3 is FIFO.
    pub fn pick_next(&mut self, m: &Machine) -> Option<Thread> {
        assert!(m.interrupt.is_off(), "scheduler: pick_next with interrupts enabled");
        let (level, index) = if !self.l1.is_empty() {
            let mut best = 0;
            for (i, t) in self.l1.iter().enumerate() {
                if t.remaining_burst() < self.l1[best].remaining_burst() {
                    best = i;
                }
            }
            (QueueLevel::L1, best)
        } else if !self.l2.is_empty() {
            let mut best = 0;
            for (i, t) in self.l2.iter().enumerate() {
                if t.priority() > self.l2[best].priority() {
                    best = i;
                }
            }
            (QueueLevel::L2, best)
        } else if !self.l3.is_empty() {
            (QueueLevel::L3, 0)
        } else {
            return None;
        };

        let thread = self.queue_mut(level).remove(index).unwrap();
        log_removed(m.clock.ticks(), thread.id(), level);
        Some(thread)
    }

    // ── Dispatcher ──────────────────────────────────────────────────

    /// Switch the CPU from the running thread to `next`.
    ///
    /// The caller has already set the outgoing thread's status to Ready or
    /// Blocked — or passes `finishing = true`, in which case the outgoing
    /// thread is staged for destruction and reaped once the successor has
    /// the CPU (never while its own state is still live).
    ///
    /// A Ready outgoing thread re-enters its queue here; a Blocked one is
    /// handed back to the caller to park.
    pub fn run(&mut self, mut next: Thread, finishing: bool, m: &Machine) -> Option<Thread> {
        assert!(m.interrupt.is_off(), "scheduler: run with interrupts enabled");
        let mut old = self.current.take().expect("scheduler: dispatch with no running thread");
        let now = m.clock.ticks();

        if finishing {
            old.set_status(ThreadStatus::Finished);
        }
        if let Some(space) = old.user_space_mut() {
            space.save_state();
        }
        let executed = old.fold_burst(now);
        let old_id = old.id();

        let mut parked = None;
        match old.status() {
            ThreadStatus::Finished => self.stage_destruction(old),
            ThreadStatus::Ready => self.admit(old, m),
            ThreadStatus::Blocked => parked = Some(old),
            s => panic!("scheduler: outgoing thread {old_id} in unexpected state {s:?}"),
        }

        next.set_status(ThreadStatus::Running);
        next.note_dispatch(now);
        log::debug!(
            target: "sched",
            "[E] Tick[{now}]: Thread [{}] is now selected for execution, thread [{old_id}] is replaced, and it has executed [{executed}] ticks",
            next.id()
        );
        self.current = Some(next);

        // The machine-level switch would happen here; the simulation
        // resumes immediately on the successor's side of it.
        self.reap();
        if let Some(space) = self.current.as_mut().unwrap().user_space_mut() {
            space.restore_state();
        }
        parked
    }

    // ── TerminationSink ─────────────────────────────────────────────

    /// Stage a finished thread for destruction.
    ///
    /// # Panics
    /// If a destruction is already pending — at most one thread can be
    /// between its final switch and its reaping.
    pub(crate) fn stage_destruction(&mut self, thread: Thread) {
        assert!(
            self.to_be_destroyed.is_none(),
            "scheduler: two threads finishing at once"
        );
        self.to_be_destroyed = Some(thread);
    }

    /// Destroy the staged thread, if any. Runs on the successor's side of
    /// the switch, when the finished thread's state is no longer live.
    pub(crate) fn reap(&mut self) {
        if let Some(dead) = self.to_be_destroyed.take() {
            log::trace!(target: "sched", "destroying finished thread [{}]", dead.id());
        }
    }

    // ── AgingDriver ─────────────────────────────────────────────────

    /// One aging pass over every ready thread.
    ///
    /// Folds each thread's waiting time, applies priority boosts, and
    /// promotes threads whose new priority belongs to a higher queue.
    /// Each queue is snapshotted (drained and rebuilt) before mutation so
    /// a promoted thread is never visited twice in one pass and relative
    /// order within a queue is preserved.
    pub fn aging_tick(&mut self, m: &Machine) {
        assert!(m.interrupt.is_off(), "scheduler: aging with interrupts enabled");
        let now = m.clock.ticks();
        for level in [QueueLevel::L1, QueueLevel::L2, QueueLevel::L3] {
            let snapshot = std::mem::take(self.queue_mut(level));
            for mut thread in snapshot {
                thread.record_wait(now);
                if let Some((p1, p2)) = thread.boost_priority() {
                    log::debug!(
                        target: "sched",
                        "[L] Tick[{now}]: Thread [{}] changes its priority from [{p1}] to [{p2}]",
                        thread.id()
                    );
                }
                let home = QueueLevel::for_priority(thread.priority());
                if home != level {
                    log_removed(now, thread.id(), level);
                    log_inserted(now, thread.id(), home);
                }
                self.queue_mut(home).push_back(thread);
            }
        }
    }

    // ── Inspection ──────────────────────────────────────────────────

    /// Number of queued (Ready) threads, excluding the running one.
    pub fn ready_count(&self) -> usize {
        self.l1.len() + self.l2.len() + self.l3.len()
    }

    /// Iterate every queued thread with the queue it sits in, in queue
    /// order (L1, then L2, then L3).
    pub fn ready_threads(&self) -> impl Iterator<Item = (QueueLevel, &Thread)> {
        self.l1
            .iter()
            .map(|t| (QueueLevel::L1, t))
            .chain(self.l2.iter().map(|t| (QueueLevel::L2, t)))
            .chain(self.l3.iter().map(|t| (QueueLevel::L3, t)))
    }

    /// Smallest remaining burst among queued L1 threads.
    pub fn min_l1_burst(&self) -> Option<f64> {
        self.l1
            .iter()
            .map(Thread::remaining_burst)
            .fold(None, |acc, b| match acc {
                Some(best) if best <= b => Some(best),
                _ => Some(b),
            })
    }

    /// Admission tick of the thread at the head of L3.
    pub fn l3_head_queued_since(&self) -> Option<u64> {
        self.l3.front().map(Thread::queued_since)
    }

    /// Dump the ready queues for debugging.
    pub fn print(&self) {
        for (name, queue) in [("L1", &self.l1), ("L2", &self.l2), ("L3", &self.l3)] {
            println!("{name} contents:");
            for t in queue {
                println!(
                    "  {} (id {}, priority {}, burst {:.2})",
                    t.name(),
                    t.id(),
                    t.priority(),
                    t.remaining_burst()
                );
            }
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

fn log_inserted(now: u64, id: u64, level: QueueLevel) {
    log::debug!(
        target: "sched",
        "[A] Tick[{now}]: Thread [{id}] is inserted into queue L[{}]",
        level.number()
    );
}

fn log_removed(now: u64, id: u64, level: QueueLevel) {
    log::debug!(
        target: "sched",
        "[B] Tick[{now}]: Thread [{id}] is removed from queue L[{}]",
        level.number()
    );
}
