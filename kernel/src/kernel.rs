//! The kernel context.
//!
//! One value owning the simulated machine and the scheduler, threaded
//! explicitly to every operation — there is no process-wide kernel
//! singleton. `boot` and shutdown bracket its lifetime.
//!
//! Every entry point brackets its critical section NachOS-style: disable
//! interrupts, do the work, restore the previous level.

use machine::{IntLevel, Machine};

use crate::task::scheduler::AGING_PERIOD;
use crate::task::thread::{Thread, ThreadStatus};
use crate::task::{QueueLevel, Scheduler};

/// The kernel: machine state, scheduler, and the parking lot for blocked
/// threads.
pub struct Kernel {
    pub machine: Machine,
    pub scheduler: Scheduler,
    blocked: Vec<Thread>,
}

impl Kernel {
    /// Bring the kernel up with an initial running thread.
    pub fn boot(name: &str) -> Self {
        let machine = Machine::new();
        let mut scheduler = Scheduler::new();
        let mut main = Thread::new(name, 0, 0.0);
        main.note_dispatch(0);
        scheduler.set_current(main);
        log::trace!(target: "sched", "booted with main thread");
        Self {
            machine,
            scheduler,
            blocked: Vec::new(),
        }
    }

    /// Create a thread and admit it to the ready queues. Returns its id.
    ///
    /// A higher-urgency arrival does not preempt immediately; the running
    /// thread keeps the CPU until the next scheduling check (`one_tick`)
    /// or a voluntary suspension point.
    pub fn spawn(&mut self, name: &str, priority: u32, burst: f64) -> u64 {
        let thread = Thread::new(name, priority, burst);
        let id = thread.id();
        let old = self.machine.interrupt.set_level(IntLevel::Off);
        self.scheduler.admit(thread, &self.machine);
        self.machine.interrupt.set_level(old);
        id
    }

    /// Id of the thread currently on the CPU.
    pub fn current_id(&self) -> Option<u64> {
        self.scheduler.current().map(Thread::id)
    }

    /// Voluntarily give up the CPU. If anything else is runnable, the
    /// current thread goes back to its ready queue and the scheduler's
    /// choice takes over; otherwise the current thread just keeps running.
    pub fn yield_now(&mut self) {
        let old = self.machine.interrupt.set_level(IntLevel::Off);
        if let Some(next) = self.scheduler.pick_next(&self.machine) {
            self.scheduler
                .current_mut()
                .expect("yield with no running thread")
                .set_status(ThreadStatus::Ready);
            let parked = self.scheduler.run(next, false, &self.machine);
            debug_assert!(parked.is_none());
        }
        self.machine.interrupt.set_level(old);
    }

    /// Block the current thread (simulated I/O). It leaves the CPU
    /// immediately; if nothing else is runnable the CPU idles until the
    /// next admission.
    pub fn block_current(&mut self) {
        let old = self.machine.interrupt.set_level(IntLevel::Off);
        if let Some(next) = self.scheduler.pick_next(&self.machine) {
            self.scheduler
                .current_mut()
                .expect("block with no running thread")
                .set_status(ThreadStatus::Blocked);
            if let Some(parked) = self.scheduler.run(next, false, &self.machine) {
                self.blocked.push(parked);
            }
        } else {
            let mut cur = self
                .scheduler
                .detach_current()
                .expect("block with no running thread");
            cur.set_status(ThreadStatus::Blocked);
            self.blocked.push(cur);
        }
        self.machine.interrupt.set_level(old);
    }

    /// Wake a blocked thread and admit it back to the ready queues.
    /// Returns false if no blocked thread has that id.
    pub fn unblock(&mut self, id: u64) -> bool {
        let Some(pos) = self.blocked.iter().position(|t| t.id() == id) else {
            return false;
        };
        let thread = self.blocked.swap_remove(pos);
        let old = self.machine.interrupt.set_level(IntLevel::Off);
        self.scheduler.admit(thread, &self.machine);
        self.machine.interrupt.set_level(old);
        true
    }

    /// Terminate the current thread. Its control block is staged in the
    /// termination sink and destroyed only after a successor has taken the
    /// CPU — never while its own state is still in use. With nothing left
    /// to run, the CPU goes idle.
    pub fn finish_current(&mut self) {
        let old = self.machine.interrupt.set_level(IntLevel::Off);
        if let Some(next) = self.scheduler.pick_next(&self.machine) {
            self.scheduler.run(next, true, &self.machine);
        } else {
            // No successor: retire the thread through the sink directly.
            let mut cur = self
                .scheduler
                .detach_current()
                .expect("finish with no running thread");
            cur.set_status(ThreadStatus::Finished);
            self.scheduler.stage_destruction(cur);
            self.scheduler.reap();
        }
        self.machine.interrupt.set_level(old);
    }

    /// Advance simulated time by one tick.
    ///
    /// Every [`AGING_PERIOD`] ticks this is a scheduling check: the aging
    /// driver runs, and then the preemption rule is applied — L1 and L3
    /// are preemptive with respect to the running thread, L2 is not.
    pub fn one_tick(&mut self) {
        let old = self.machine.interrupt.set_level(IntLevel::Off);
        let now = self.machine.clock.advance(1);
        if now % AGING_PERIOD == 0 {
            self.scheduler.aging_tick(&self.machine);
            if self.scheduler.current().is_none() {
                // CPU was idle; resume with whatever is runnable.
                if let Some(next) = self.scheduler.pick_next(&self.machine) {
                    self.scheduler.set_current(next);
                    self.scheduler
                        .current_mut()
                        .unwrap()
                        .note_dispatch(now);
                }
            } else if self.should_preempt() {
                if let Some(next) = self.scheduler.pick_next(&self.machine) {
                    self.scheduler
                        .current_mut()
                        .unwrap()
                        .set_status(ThreadStatus::Ready);
                    self.scheduler.run(next, false, &self.machine);
                }
            }
        }
        self.machine.interrupt.set_level(old);
    }

    /// Advance simulated time by `n` ticks.
    pub fn run_ticks(&mut self, n: u64) {
        for _ in 0..n {
            self.one_tick();
        }
    }

    /// Whether the running thread loses the CPU at this scheduling check.
    ///
    /// - An L1 thread is preempted by a queued L1 thread with strictly
    ///   smaller remaining burst (ties keep the incumbent).
    /// - Any thread below the L1 band is preempted by any queued L1
    ///   thread.
    /// - An L3 thread is rotated out when the L3 head was already queued
    ///   when it last took the CPU.
    /// - An L2 thread is never preempted by its L2 peers.
    fn should_preempt(&self) -> bool {
        let Some(cur) = self.scheduler.current() else {
            return false;
        };
        let level = QueueLevel::for_priority(cur.priority());
        if let Some(min_burst) = self.scheduler.min_l1_burst() {
            return match level {
                QueueLevel::L1 => min_burst < cur.remaining_burst(),
                _ => true,
            };
        }
        if level == QueueLevel::L3 {
            if let Some(head_admitted) = self.scheduler.l3_head_queued_since() {
                return head_admitted <= cur.start_of_run();
            }
        }
        false
    }

    /// Dump the scheduler state.
    pub fn print(&self) {
        self.scheduler.print();
    }
}
