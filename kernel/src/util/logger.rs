//! Kernel logging.
//!
//! A small backend for the `log` facade: one colored, level-tagged line
//! per record, written to stderr. Info and above always print; debug and
//! trace print only for the subsystems selected in [`DebugFlags`], which
//! stand in for the classic per-subsystem debug letters (`s` scheduler,
//! `f` file system, `d` disk).

use std::sync::atomic::{AtomicU32, Ordering};

use bitflags::bitflags;
use log::{Level, LevelFilter, Log, Metadata, Record};

bitflags! {
    /// Which subsystems emit debug/trace lines.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DebugFlags: u32 {
        const SCHED = 1 << 0;
        const FS    = 1 << 1;
        const DISK  = 1 << 2;
    }
}

impl DebugFlags {
    /// Parse a NachOS-style flag string: `s` scheduler, `f` file system,
    /// `d` disk, `+` everything. Unknown letters are ignored.
    pub fn parse(s: &str) -> Self {
        let mut flags = DebugFlags::empty();
        for c in s.chars() {
            match c {
                's' => flags |= DebugFlags::SCHED,
                'f' => flags |= DebugFlags::FS,
                'd' => flags |= DebugFlags::DISK,
                '+' => flags = DebugFlags::all(),
                _ => {}
            }
        }
        flags
    }
}

static DEBUG_FLAGS: AtomicU32 = AtomicU32::new(0);

struct KernelLogger;

static LOGGER: KernelLogger = KernelLogger;

/// Install the logger. Safe to call more than once; later calls just
/// update the debug flags.
pub fn init(flags: DebugFlags) {
    DEBUG_FLAGS.store(flags.bits(), Ordering::Relaxed);
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(LevelFilter::Trace);
    }
}

fn color(level: Level) -> &'static str {
    match level {
        Level::Trace => "\x1b[90m", // Gray
        Level::Debug => "\x1b[36m", // Cyan
        Level::Info => "\x1b[32m",  // Green
        Level::Warn => "\x1b[33m",  // Yellow
        Level::Error => "\x1b[31m", // Red
    }
}

impl Log for KernelLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        if metadata.level() <= Level::Info {
            return true;
        }
        let flags = DebugFlags::from_bits_truncate(DEBUG_FLAGS.load(Ordering::Relaxed));
        match metadata.target() {
            "sched" => flags.contains(DebugFlags::SCHED),
            "fs" => flags.contains(DebugFlags::FS),
            "disk" => flags.contains(DebugFlags::DISK),
            _ => false,
        }
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        eprintln!(
            "{}[{:>5}]\x1b[0m {}",
            color(record.level()),
            record.level(),
            record.args()
        );
    }

    fn flush(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_letters_parse() {
        assert_eq!(DebugFlags::parse(""), DebugFlags::empty());
        assert_eq!(DebugFlags::parse("s"), DebugFlags::SCHED);
        assert_eq!(DebugFlags::parse("fd"), DebugFlags::FS | DebugFlags::DISK);
        assert_eq!(DebugFlags::parse("x+"), DebugFlags::all());
    }
}
