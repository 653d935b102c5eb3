//! Live file handles.
//!
//! An `OpenFile` binds a header sector and supports positional and
//! cursor-style reads and writes. Files have the size they were created
//! with — reads and writes clamp at the end, nothing extends.
//!
//! Handles do not synchronize with one another: the file system is
//! single-accessor, and two handles on the same file see each other's
//! writes only through the disk.

use machine::disk::{Disk, SECTOR_SIZE};

use crate::fs::header::FileHeader;

/// An open file, bound to the sector holding its header.
pub struct OpenFile {
    sector: u32,
    hdr: FileHeader,
    seek: usize,
}

impl OpenFile {
    /// Open the file whose header lives at `sector`.
    pub fn new(disk: &Disk, sector: u32) -> Self {
        Self {
            sector,
            hdr: FileHeader::fetch_from(disk, sector),
            seek: 0,
        }
    }

    /// The sector holding this file's header.
    pub fn sector(&self) -> u32 {
        self.sector
    }

    /// File length in bytes.
    pub fn length(&self) -> usize {
        self.hdr.file_length()
    }

    pub fn header(&self) -> &FileHeader {
        &self.hdr
    }

    /// Set the cursor for `read`/`write`.
    pub fn seek(&mut self, pos: usize) {
        self.seek = pos;
    }

    /// Read up to `buf.len()` bytes starting at `offset`. Returns the
    /// number of bytes read; 0 at or past end-of-file.
    pub fn read_at(&self, disk: &Disk, buf: &mut [u8], offset: usize) -> usize {
        let len = self.hdr.file_length();
        if offset >= len || buf.is_empty() {
            return 0;
        }
        let n = buf.len().min(len - offset);
        let mut tmp = [0u8; SECTOR_SIZE];
        let mut copied = 0;
        while copied < n {
            let pos = offset + copied;
            let sector = self.hdr.byte_to_sector(disk, pos) as usize;
            let in_sector = pos % SECTOR_SIZE;
            let chunk = (SECTOR_SIZE - in_sector).min(n - copied);
            disk.read_sector(sector, &mut tmp);
            buf[copied..copied + chunk].copy_from_slice(&tmp[in_sector..in_sector + chunk]);
            copied += chunk;
        }
        n
    }

    /// Write up to `buf.len()` bytes starting at `offset`. Returns the
    /// number of bytes written; 0 at or past end-of-file. Partial sectors
    /// at either end are read-modified-written.
    pub fn write_at(&self, disk: &Disk, buf: &[u8], offset: usize) -> usize {
        let len = self.hdr.file_length();
        if offset >= len || buf.is_empty() {
            return 0;
        }
        let n = buf.len().min(len - offset);
        let mut tmp = [0u8; SECTOR_SIZE];
        let mut copied = 0;
        while copied < n {
            let pos = offset + copied;
            let sector = self.hdr.byte_to_sector(disk, pos) as usize;
            let in_sector = pos % SECTOR_SIZE;
            let chunk = (SECTOR_SIZE - in_sector).min(n - copied);
            if chunk < SECTOR_SIZE {
                disk.read_sector(sector, &mut tmp);
            }
            tmp[in_sector..in_sector + chunk].copy_from_slice(&buf[copied..copied + chunk]);
            disk.write_sector(sector, &tmp);
            copied += chunk;
        }
        n
    }

    /// Read from the cursor, advancing it.
    pub fn read(&mut self, disk: &Disk, buf: &mut [u8]) -> usize {
        let n = self.read_at(disk, buf, self.seek);
        self.seek += n;
        n
    }

    /// Write at the cursor, advancing it.
    pub fn write(&mut self, disk: &Disk, buf: &[u8]) -> usize {
        let n = self.write_at(disk, buf, self.seek);
        self.seek += n;
        n
    }

    /// Read the whole file.
    pub fn read_all(&self, disk: &Disk) -> Vec<u8> {
        let mut buf = vec![0u8; self.length()];
        let n = self.read_at(disk, &mut buf, 0);
        buf.truncate(n);
        buf
    }
}
