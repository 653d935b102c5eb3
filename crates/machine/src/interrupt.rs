//! Simulated CPU interrupt-enable flag.
//!
//! On a single simulated processor, "interrupts off" is the kernel's only
//! mutual-exclusion mechanism: every scheduler entry point asserts the flag
//! is off before touching the ready queues. The flag itself is just a bit;
//! the discipline is the NachOS-style save/restore bracket:
//!
//! ```
//! # use machine::{Interrupt, IntLevel};
//! # let interrupt = Interrupt::new();
//! let old = interrupt.set_level(IntLevel::Off);
//! // ... critical section ...
//! interrupt.set_level(old);
//! ```

use core::sync::atomic::{AtomicBool, Ordering};

/// Whether the simulated CPU accepts timer interrupts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntLevel {
    Off,
    On,
}

/// The interrupt-enable flag of the simulated CPU. Starts enabled.
pub struct Interrupt {
    enabled: AtomicBool,
}

impl Interrupt {
    pub const fn new() -> Self {
        Self {
            enabled: AtomicBool::new(true),
        }
    }

    /// Set the interrupt level, returning the previous one so callers can
    /// restore it on exit.
    pub fn set_level(&self, level: IntLevel) -> IntLevel {
        let was = self.enabled.swap(level == IntLevel::On, Ordering::Relaxed);
        if was { IntLevel::On } else { IntLevel::Off }
    }

    /// Current interrupt level.
    pub fn level(&self) -> IntLevel {
        if self.enabled.load(Ordering::Relaxed) {
            IntLevel::On
        } else {
            IntLevel::Off
        }
    }

    /// True when interrupts are disabled.
    #[inline]
    pub fn is_off(&self) -> bool {
        self.level() == IntLevel::Off
    }
}

impl Default for Interrupt {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_level_returns_previous() {
        let int = Interrupt::new();
        assert_eq!(int.level(), IntLevel::On);
        assert_eq!(int.set_level(IntLevel::Off), IntLevel::On);
        assert!(int.is_off());
        assert_eq!(int.set_level(IntLevel::Off), IntLevel::Off);
        assert_eq!(int.set_level(IntLevel::On), IntLevel::Off);
        assert!(!int.is_off());
    }
}
