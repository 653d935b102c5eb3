//! Disk file headers (i-nodes) with recursive multilevel indexing.
//!
//! A header is exactly one sector: the file's byte length, its data-sector
//! count, and a fixed table of sector pointers. What the pointers mean
//! depends on the header's *shape*, which is a pure function of the byte
//! length at allocation time:
//!
//!   level 1 (leaf): pointers address raw data sectors — up to
//!                   `NUM_DIRECT * SECTOR_SIZE` bytes (`LIMIT_1`)
//!   level 2:        pointers address level-1 subheaders — up to `LIMIT_2`
//!   level 3:        pointers address level-2 subheaders — up to `LIMIT_3`
//!   level 4:        pointers address level-3 subheaders
//!
//! Allocation builds the whole subtree in memory (children ride along in a
//! transient vector that is never serialized) and takes sectors from the
//! free map as it goes; nothing touches the disk until `write_back`. A
//! failed allocation is therefore discarded wholesale — the image on disk
//! is unchanged, which is what keeps failed create operations invisible.
//! Reads go the other way: `fetch_from` loads a single raw sector and
//! children are fetched lazily, only when the byte range being translated
//! falls into them.

use machine::disk::{Disk, SECTOR_SIZE};

use crate::fs::error::{FsError, FsResult};
use crate::fs::freemap::FreeMap;

/// Number of sector pointers in one header sector.
pub const NUM_DIRECT: usize = (SECTOR_SIZE - 2 * 4) / 4;

/// Largest file a level-1 (leaf) header can describe.
pub const LIMIT_1: usize = NUM_DIRECT * SECTOR_SIZE;
/// Largest file a level-2 header can describe.
pub const LIMIT_2: usize = NUM_DIRECT * LIMIT_1;
/// Largest file a level-3 header can describe.
pub const LIMIT_3: usize = NUM_DIRECT * LIMIT_2;
/// Largest file any header can describe (level 4).
pub const MAX_FILE_SIZE: usize = NUM_DIRECT * LIMIT_3;

/// Bytes covered by one child of a header at `level`.
fn child_span(level: u8) -> usize {
    match level {
        2 => LIMIT_1,
        3 => LIMIT_2,
        4 => LIMIT_3,
        _ => panic!("file header: level {level} has no children"),
    }
}

/// The shape a file of `num_bytes` gets at allocation time.
fn shape_level(num_bytes: usize) -> u8 {
    if num_bytes <= LIMIT_1 {
        1
    } else if num_bytes <= LIMIT_2 {
        2
    } else if num_bytes <= LIMIT_3 {
        3
    } else {
        4
    }
}

/// A file header, in memory.
#[derive(Debug)]
pub struct FileHeader {
    num_bytes: u32,
    num_sectors: u32,
    data_sectors: [u32; NUM_DIRECT],
    /// Freshly allocated subheaders waiting for `write_back`. Empty on
    /// headers fetched from disk — those materialize children lazily.
    children: Vec<FileHeader>,
}

impl FileHeader {
    /// Build a header (and its whole subtree of subheaders) for a file of
    /// `size` bytes, taking sectors from `free_map`.
    ///
    /// Fails with `OutOfSpace` the moment the map runs dry, at any
    /// recursion level. No disk I/O happens here; on failure the caller
    /// discards both this partial tree and its copy of the free map.
    pub fn allocate(free_map: &mut FreeMap, size: usize) -> FsResult<FileHeader> {
        assert!(size <= MAX_FILE_SIZE, "file header: {size} bytes is unaddressable");
        let level = shape_level(size);
        let mut hdr = FileHeader {
            num_bytes: size as u32,
            num_sectors: size.div_ceil(SECTOR_SIZE) as u32,
            data_sectors: [0; NUM_DIRECT],
            children: Vec::new(),
        };

        if level == 1 {
            for i in 0..hdr.num_sectors as usize {
                hdr.data_sectors[i] = free_map.find_and_set().ok_or(FsError::OutOfSpace)?;
            }
        } else {
            let span = child_span(level);
            let mut remaining = size;
            let mut i = 0;
            while remaining > 0 {
                hdr.data_sectors[i] = free_map.find_and_set().ok_or(FsError::OutOfSpace)?;
                let child = FileHeader::allocate(free_map, remaining.min(span))?;
                hdr.children.push(child);
                remaining = remaining.saturating_sub(span);
                i += 1;
            }
        }
        Ok(hdr)
    }

    /// Read a header from its sector. Children are not prefetched.
    pub fn fetch_from(disk: &Disk, sector: u32) -> FileHeader {
        let mut buf = [0u8; SECTOR_SIZE];
        disk.read_sector(sector as usize, &mut buf);
        let mut data_sectors = [0u32; NUM_DIRECT];
        for (i, s) in data_sectors.iter_mut().enumerate() {
            let off = 8 + i * 4;
            *s = u32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
        }
        FileHeader {
            num_bytes: u32::from_le_bytes(buf[0..4].try_into().unwrap()),
            num_sectors: u32::from_le_bytes(buf[4..8].try_into().unwrap()),
            data_sectors,
            children: Vec::new(),
        }
    }

    /// Write this header to `sector`, and freshly allocated subheaders to
    /// theirs, recursively.
    pub fn write_back(&self, disk: &Disk, sector: u32) {
        let mut buf = [0u8; SECTOR_SIZE];
        buf[0..4].copy_from_slice(&self.num_bytes.to_le_bytes());
        buf[4..8].copy_from_slice(&self.num_sectors.to_le_bytes());
        for (i, s) in self.data_sectors.iter().enumerate() {
            let off = 8 + i * 4;
            buf[off..off + 4].copy_from_slice(&s.to_le_bytes());
        }
        disk.write_sector(sector as usize, &buf);
        for (i, child) in self.children.iter().enumerate() {
            child.write_back(disk, self.data_sectors[i]);
        }
    }

    /// Translate a byte offset within the file to the data sector storing
    /// it. Non-leaf headers fetch the covering child from disk and return
    /// the child's translation of the residual offset.
    ///
    /// # Panics
    /// If `offset` is beyond the end of the file.
    pub fn byte_to_sector(&self, disk: &Disk, offset: usize) -> u32 {
        assert!(
            offset < self.num_bytes as usize,
            "file header: offset {offset} beyond length {}",
            self.num_bytes
        );
        let level = self.level();
        if level == 1 {
            self.data_sectors[offset / SECTOR_SIZE]
        } else {
            let span = child_span(level);
            let which = offset / span;
            let child = FileHeader::fetch_from(disk, self.data_sectors[which]);
            child.byte_to_sector(disk, offset - which * span)
        }
    }

    /// Return every sector in this header's subtree to the free map:
    /// data sectors for leaves, then each child's subtree plus the child
    /// header sector itself for indirect shapes. The sector holding *this*
    /// header is the caller's to clear.
    pub fn deallocate(&self, disk: &Disk, free_map: &mut FreeMap) {
        if self.level() == 1 {
            for i in 0..self.num_sectors as usize {
                free_map.clear(self.data_sectors[i]);
            }
        } else {
            for i in 0..self.child_count() {
                let child = FileHeader::fetch_from(disk, self.data_sectors[i]);
                child.deallocate(disk, free_map);
                free_map.clear(self.data_sectors[i]);
            }
        }
    }

    /// File length in bytes.
    pub fn file_length(&self) -> usize {
        self.num_bytes as usize
    }

    /// Data sectors covered by this header's subtree.
    pub fn num_sectors(&self) -> usize {
        self.num_sectors as usize
    }

    /// The header's shape (1 = leaf .. 4), derived from its byte length.
    pub fn level(&self) -> u8 {
        shape_level(self.num_bytes as usize)
    }

    fn child_count(&self) -> usize {
        (self.num_bytes as usize).div_ceil(child_span(self.level()))
    }

    /// Dump the header tree (sizes and sector numbers) for debugging.
    pub fn print(&self, disk: &Disk, indent: usize) {
        let pad = "  ".repeat(indent);
        let level = self.level();
        println!(
            "{pad}header: {} bytes, {} data sectors, level {level}",
            self.num_bytes, self.num_sectors
        );
        if level == 1 {
            let sectors: Vec<u32> = self.data_sectors[..self.num_sectors as usize].to_vec();
            println!("{pad}  data sectors: {sectors:?}");
        } else {
            for i in 0..self.child_count() {
                println!("{pad}  subheader at sector {}:", self.data_sectors[i]);
                let child = FileHeader::fetch_from(disk, self.data_sectors[i]);
                child.print(disk, indent + 1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map_with_reserved() -> FreeMap {
        let mut map = FreeMap::new();
        map.mark(0);
        map.mark(1);
        map
    }

    #[test]
    fn fan_out_matches_the_sector_geometry() {
        // (128 - 8) / 4 pointers per sector.
        assert_eq!(NUM_DIRECT, 30);
        assert_eq!(LIMIT_1, 3_840);
        assert_eq!(LIMIT_2, 115_200);
        assert_eq!(LIMIT_3, 3_456_000);
    }

    #[test]
    fn shape_is_chosen_by_length() {
        assert_eq!(shape_level(0), 1);
        assert_eq!(shape_level(LIMIT_1), 1);
        assert_eq!(shape_level(LIMIT_1 + 1), 2);
        assert_eq!(shape_level(LIMIT_2), 2);
        assert_eq!(shape_level(LIMIT_2 + 1), 3);
        assert_eq!(shape_level(200_000), 3);
        assert_eq!(shape_level(LIMIT_3 + 1), 4);
    }

    #[test]
    fn leaf_allocation_takes_exactly_the_data_sectors() {
        let mut map = map_with_reserved();
        let before = map.num_clear();
        let hdr = FileHeader::allocate(&mut map, 1000).unwrap();
        assert_eq!(hdr.level(), 1);
        assert_eq!(hdr.num_sectors(), 8);
        assert_eq!(before - map.num_clear(), 8);
    }

    #[test]
    fn indirect_allocation_accounts_for_subheaders() {
        let mut map = map_with_reserved();
        let before = map.num_clear();
        // Two full leaves and one partial: 3 subheaders + 61 data sectors.
        let size = 2 * LIMIT_1 + 100;
        let hdr = FileHeader::allocate(&mut map, size).unwrap();
        assert_eq!(hdr.level(), 2);
        assert_eq!(before - map.num_clear(), 3 + 61);
    }

    #[test]
    fn shape_round_trips_through_persistence() {
        let disk = Disk::in_memory();
        let mut map = map_with_reserved();
        let hdr = FileHeader::allocate(&mut map, 2 * LIMIT_1 + 100).unwrap();
        let sector = map.find_and_set().unwrap();
        hdr.write_back(&disk, sector);

        let back = FileHeader::fetch_from(&disk, sector);
        assert_eq!(back.level(), 2);
        assert_eq!(back.file_length(), 2 * LIMIT_1 + 100);
        assert_eq!(back.num_sectors(), hdr.num_sectors());
    }

    #[test]
    fn byte_to_sector_is_total_and_lands_on_allocated_sectors() {
        let disk = Disk::in_memory();
        let mut map = map_with_reserved();
        let size = LIMIT_1 * 3 + 500;
        let hdr = FileHeader::allocate(&mut map, size).unwrap();
        let sector = map.find_and_set().unwrap();
        hdr.write_back(&disk, sector);

        let back = FileHeader::fetch_from(&disk, sector);
        for offset in (0..size).step_by(SECTOR_SIZE / 2) {
            let s = back.byte_to_sector(&disk, offset);
            assert!(map.test(s), "offset {offset} mapped to unallocated sector {s}");
        }
        back.byte_to_sector(&disk, size - 1);
    }

    #[test]
    #[should_panic(expected = "beyond length")]
    fn byte_to_sector_rejects_out_of_range_offsets() {
        let disk = Disk::in_memory();
        let mut map = map_with_reserved();
        let hdr = FileHeader::allocate(&mut map, 100).unwrap();
        hdr.byte_to_sector(&disk, 100);
    }

    #[test]
    fn deallocate_mirrors_allocate() {
        let disk = Disk::in_memory();
        let mut map = map_with_reserved();
        let baseline = map.num_clear();

        let size = 2 * LIMIT_1 + 700;
        let hdr = FileHeader::allocate(&mut map, size).unwrap();
        let sector = map.find_and_set().unwrap();
        hdr.write_back(&disk, sector);
        assert!(map.num_clear() < baseline);

        let back = FileHeader::fetch_from(&disk, sector);
        back.deallocate(&disk, &mut map);
        map.clear(sector);
        assert_eq!(map.num_clear(), baseline);
    }

    #[test]
    fn allocation_fails_cleanly_when_the_map_runs_dry() {
        let mut map = FreeMap::new();
        // Leave ten free sectors; a level-2 file needs more.
        for _ in 0..machine::disk::NUM_SECTORS - 10 {
            map.find_and_set().unwrap();
        }
        let err = FileHeader::allocate(&mut map, 2 * LIMIT_1).unwrap_err();
        assert_eq!(err, FsError::OutOfSpace);
    }

    #[test]
    fn zero_length_file_owns_no_sectors() {
        let mut map = map_with_reserved();
        let before = map.num_clear();
        let hdr = FileHeader::allocate(&mut map, 0).unwrap();
        assert_eq!(hdr.num_sectors(), 0);
        assert_eq!(map.num_clear(), before);
    }
}
