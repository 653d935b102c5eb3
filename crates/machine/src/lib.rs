//! Simulated hardware for the Mica kernel.
//!
//! Everything the kernel would normally get from real silicon comes from
//! here instead: a monotonic tick counter standing in for the timer, an
//! interrupt-enable flag standing in for the CPU's interrupt state, and a
//! sector-granular synchronous disk backed by an image file (or by memory,
//! for tests).

pub mod clock;
pub mod disk;
pub mod interrupt;

pub use clock::Clock;
pub use disk::Disk;
pub use interrupt::{IntLevel, Interrupt};

/// The simulated machine the kernel runs on: one CPU's interrupt state plus
/// the timer's tick counter.
///
/// The disk is deliberately *not* part of this bundle — it belongs to
/// whoever mounts a file system on it, while the clock and interrupt flag
/// are shared by every scheduler entry point.
pub struct Machine {
    pub clock: Clock,
    pub interrupt: Interrupt,
}

impl Machine {
    pub fn new() -> Self {
        Self {
            clock: Clock::new(),
            interrupt: Interrupt::new(),
        }
    }
}

impl Default for Machine {
    fn default() -> Self {
        Self::new()
    }
}
