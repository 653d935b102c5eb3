//! Simulated sector disk.
//!
//! A fixed-geometry block device with synchronous, sector-granular reads
//! and writes. The backing store is either a host file (the persistent
//! disk image the CLI operates on across invocations) or a plain memory
//! buffer (tests). Callers never see the difference.
//!
//! I/O failures on the backing file are fatal: the kernel has no notion of
//! a disk that half-works, so a failed host read/write panics rather than
//! propagating.

use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use spin::Mutex;

/// Sector size in bytes. A file header is exactly one sector.
pub const SECTOR_SIZE: usize = 128;

/// Total number of sectors on the disk (512 KiB image).
pub const NUM_SECTORS: usize = 4096;

enum Backing {
    Memory(Vec<u8>),
    Image(std::fs::File),
}

/// A synchronous sector-granular disk.
pub struct Disk {
    backing: Mutex<Backing>,
}

impl Disk {
    /// A memory-backed disk, zero-filled. Contents vanish on drop.
    pub fn in_memory() -> Self {
        Self {
            backing: Mutex::new(Backing::Memory(vec![0u8; NUM_SECTORS * SECTOR_SIZE])),
        }
    }

    /// Open (or create) a disk image file of the fixed geometry.
    ///
    /// A fresh or short image is extended to the full size with zeros, so
    /// a newly created image reads back as an all-zero disk.
    pub fn open<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        file.set_len((NUM_SECTORS * SECTOR_SIZE) as u64)?;
        Ok(Self {
            backing: Mutex::new(Backing::Image(file)),
        })
    }

    /// Read one sector into `buf`.
    ///
    /// # Panics
    /// On an out-of-range sector or a host I/O failure.
    pub fn read_sector(&self, sector: usize, buf: &mut [u8; SECTOR_SIZE]) {
        assert!(sector < NUM_SECTORS, "disk: read of sector {sector} out of range");
        log::trace!(target: "disk", "read sector {sector}");
        match &mut *self.backing.lock() {
            Backing::Memory(bytes) => {
                let off = sector * SECTOR_SIZE;
                buf.copy_from_slice(&bytes[off..off + SECTOR_SIZE]);
            }
            Backing::Image(file) => {
                file.seek(SeekFrom::Start((sector * SECTOR_SIZE) as u64))
                    .and_then(|_| file.read_exact(buf))
                    .unwrap_or_else(|e| panic!("disk: read of sector {sector} failed: {e}"));
            }
        }
    }

    /// Write one sector from `buf`.
    ///
    /// # Panics
    /// On an out-of-range sector or a host I/O failure.
    pub fn write_sector(&self, sector: usize, buf: &[u8; SECTOR_SIZE]) {
        assert!(sector < NUM_SECTORS, "disk: write of sector {sector} out of range");
        log::trace!(target: "disk", "write sector {sector}");
        match &mut *self.backing.lock() {
            Backing::Memory(bytes) => {
                let off = sector * SECTOR_SIZE;
                bytes[off..off + SECTOR_SIZE].copy_from_slice(buf);
            }
            Backing::Image(file) => {
                file.seek(SeekFrom::Start((sector * SECTOR_SIZE) as u64))
                    .and_then(|_| file.write_all(buf))
                    .unwrap_or_else(|e| panic!("disk: write of sector {sector} failed: {e}"));
            }
        }
    }

    /// Copy the entire disk contents out, sector order.
    ///
    /// Used by tests that assert byte-equality of the image around failed
    /// operations; not part of the kernel's I/O path.
    pub fn snapshot(&self) -> Vec<u8> {
        let mut out = vec![0u8; NUM_SECTORS * SECTOR_SIZE];
        let mut buf = [0u8; SECTOR_SIZE];
        for sector in 0..NUM_SECTORS {
            self.read_sector(sector, &mut buf);
            out[sector * SECTOR_SIZE..(sector + 1) * SECTOR_SIZE].copy_from_slice(&buf);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sector_round_trip() {
        let disk = Disk::in_memory();
        let mut pattern = [0u8; SECTOR_SIZE];
        for (i, b) in pattern.iter_mut().enumerate() {
            *b = i as u8;
        }
        disk.write_sector(42, &pattern);

        let mut back = [0u8; SECTOR_SIZE];
        disk.read_sector(42, &mut back);
        assert_eq!(back, pattern);

        // Neighbors untouched.
        disk.read_sector(41, &mut back);
        assert_eq!(back, [0u8; SECTOR_SIZE]);
        disk.read_sector(43, &mut back);
        assert_eq!(back, [0u8; SECTOR_SIZE]);
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn out_of_range_is_fatal() {
        let disk = Disk::in_memory();
        let mut buf = [0u8; SECTOR_SIZE];
        disk.read_sector(NUM_SECTORS, &mut buf);
    }
}
