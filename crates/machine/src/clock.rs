//! Simulated-time tick counter.
//!
//! Monotonically increasing counter advanced by the kernel's timer path.
//! All scheduler accounting (waiting time, burst measurement, aging) is
//! expressed in these ticks.

use core::sync::atomic::{AtomicU64, Ordering};

/// A monotonic tick counter.
pub struct Clock {
    ticks: AtomicU64,
}

impl Clock {
    pub const fn new() -> Self {
        Self {
            ticks: AtomicU64::new(0),
        }
    }

    /// Advance simulated time by `n` ticks and return the new total.
    #[inline]
    pub fn advance(&self, n: u64) -> u64 {
        self.ticks.fetch_add(n, Ordering::Relaxed) + n
    }

    /// Return the current tick count.
    #[inline]
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_is_cumulative() {
        let clock = Clock::new();
        assert_eq!(clock.ticks(), 0);
        assert_eq!(clock.advance(1), 1);
        assert_eq!(clock.advance(99), 100);
        assert_eq!(clock.ticks(), 100);
    }
}
