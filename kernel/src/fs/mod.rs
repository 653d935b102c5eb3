//! The file system.
//!
//! Layout on disk: sector 0 holds the header of the free-sector-bitmap
//! file, sector 1 the header of the root-directory file; everything else
//! is allocated on demand. Both well-known files stay open for the
//! facade's whole lifetime.
//!
//! Persistence discipline: a mutating operation that succeeds flushes its
//! changes (header, directory, free map) before returning; one that fails
//! writes nothing at all, so the disk image after a failed operation is
//! byte-identical to the image before it. There is no synchronization for
//! concurrent access — the facade is single-accessor by contract.

pub mod directory;
pub mod error;
pub mod freemap;
pub mod header;
pub mod openfile;
pub mod path;

use machine::disk::{Disk, NUM_SECTORS};

use crate::fs::directory::{Directory, DIRECTORY_FILE_SIZE};
use crate::fs::error::{FsError, FsResult};
use crate::fs::freemap::{FreeMap, FREE_MAP_FILE_SIZE};
use crate::fs::header::FileHeader;
use crate::fs::openfile::OpenFile;
use crate::fs::path::{resolve, split_parent};

/// Sector holding the free-map file's header.
pub const FREE_MAP_SECTOR: u32 = 0;

/// Sector holding the root-directory file's header.
pub const ROOT_DIRECTORY_SECTOR: u32 = 1;

/// The single entry point for all file-system operations.
pub struct FileSystem {
    disk: Disk,
    free_map_file: OpenFile,
    directory_file: OpenFile,
}

impl FileSystem {
    /// Initialize an empty file system on `disk`: a fresh free map with
    /// the two well-known header sectors marked used, data blocks for the
    /// map and the root directory, and an empty root table.
    pub fn format(disk: Disk) -> Self {
        log::debug!(target: "fs", "formatting the file system");
        let mut free_map = FreeMap::new();
        let root = Directory::new();

        free_map.mark(FREE_MAP_SECTOR);
        free_map.mark(ROOT_DIRECTORY_SECTOR);
        let map_hdr = FileHeader::allocate(&mut free_map, FREE_MAP_FILE_SIZE)
            .expect("format: no space for the free map file");
        let dir_hdr = FileHeader::allocate(&mut free_map, DIRECTORY_FILE_SIZE)
            .expect("format: no space for the root directory file");

        // Headers must hit the disk before the files can be opened —
        // opening reads the header sector back.
        map_hdr.write_back(&disk, FREE_MAP_SECTOR);
        dir_hdr.write_back(&disk, ROOT_DIRECTORY_SECTOR);

        let free_map_file = OpenFile::new(&disk, FREE_MAP_SECTOR);
        let directory_file = OpenFile::new(&disk, ROOT_DIRECTORY_SECTOR);
        free_map.write_back(&disk, &free_map_file);
        root.write_back(&disk, &directory_file);

        Self {
            disk,
            free_map_file,
            directory_file,
        }
    }

    /// Open the two well-known files on an already-formatted image.
    pub fn mount(disk: Disk) -> Self {
        log::debug!(target: "fs", "mounting an existing file system");
        let free_map_file = OpenFile::new(&disk, FREE_MAP_SECTOR);
        let directory_file = OpenFile::new(&disk, ROOT_DIRECTORY_SECTOR);
        Self {
            disk,
            free_map_file,
            directory_file,
        }
    }

    /// The disk this file system lives on.
    pub fn disk(&self) -> &Disk {
        &self.disk
    }

    /// Number of free sectors according to the persistent map.
    pub fn num_free_sectors(&self) -> usize {
        self.fetch_free_map().num_clear()
    }

    fn fetch_free_map(&self) -> FreeMap {
        FreeMap::fetch_from(&self.disk, &self.free_map_file)
    }

    /// Load the parent directory of `path` and hand back its open file,
    /// its table, and the leaf name.
    fn open_parent<'p>(&self, path: &'p str) -> FsResult<(OpenFile, Directory, &'p str)> {
        let (parent, leaf) = split_parent(path)?;
        let resolved = resolve(&self.disk, &self.directory_file, parent)?;
        if !resolved.is_directory {
            return Err(FsError::NotFound);
        }
        let file = OpenFile::new(&self.disk, resolved.sector);
        let table = Directory::fetch_from(&self.disk, &file);
        Ok((file, table, leaf))
    }

    fn create_entry(&mut self, path: &str, size: usize, is_directory: bool) -> FsResult<u32> {
        let (parent_file, mut table, leaf) = self.open_parent(path)?;
        if table.find(leaf).is_some() {
            return Err(FsError::AlreadyExists);
        }

        let mut free_map = self.fetch_free_map();
        let sector = free_map.find_and_set().ok_or(FsError::OutOfSpace)?;
        table.add(leaf, sector, is_directory)?;
        let hdr = FileHeader::allocate(&mut free_map, size)?;

        // Everything worked; flush the changes. Failures above return
        // without a single write, leaving the image as it was.
        hdr.write_back(&self.disk, sector);
        table.write_back(&self.disk, &parent_file);
        free_map.write_back(&self.disk, &self.free_map_file);
        Ok(sector)
    }

    /// Create a file of exactly `size` bytes (files cannot grow later).
    pub fn create(&mut self, path: &str, size: usize) -> FsResult<()> {
        log::debug!(target: "fs", "creating file {path} ({size} bytes)");
        self.create_entry(path, size, false)?;
        Ok(())
    }

    /// Create a directory.
    pub fn create_directory(&mut self, path: &str) -> FsResult<()> {
        log::debug!(target: "fs", "creating directory {path}");
        let sector = self.create_entry(path, DIRECTORY_FILE_SIZE, true)?;
        // The new directory file now exists on disk; fill it with an
        // empty table so lookups inside it see no entries.
        let file = OpenFile::new(&self.disk, sector);
        Directory::new().write_back(&self.disk, &file);
        Ok(())
    }

    /// Open a file (or directory file) for reading and writing.
    pub fn open(&self, path: &str) -> FsResult<OpenFile> {
        let resolved = resolve(&self.disk, &self.directory_file, path)?;
        log::debug!(target: "fs", "opened {path} at sector {}", resolved.sector);
        Ok(OpenFile::new(&self.disk, resolved.sector))
    }

    /// Remove a file, returning its sectors to the free map. A directory
    /// can be removed this way only when it is empty.
    pub fn remove(&mut self, path: &str) -> FsResult<()> {
        log::debug!(target: "fs", "removing {path}");
        let (parent_file, mut table, leaf) = self.open_parent(path)?;
        let sector = table.find(leaf).ok_or(FsError::NotFound)?;

        if table.is_directory(leaf) == Some(true) {
            let file = OpenFile::new(&self.disk, sector);
            let child = Directory::fetch_from(&self.disk, &file);
            if child.entries().next().is_some() {
                return Err(FsError::InvalidArgument(format!(
                    "directory '{path}' is not empty"
                )));
            }
        }

        let hdr = FileHeader::fetch_from(&self.disk, sector);
        let mut free_map = self.fetch_free_map();
        hdr.deallocate(&self.disk, &mut free_map);
        free_map.clear(sector);
        table.remove(leaf);

        free_map.write_back(&self.disk, &self.free_map_file);
        table.write_back(&self.disk, &parent_file);
        Ok(())
    }

    /// Remove a file, or a directory tree depth-first: every entry of a
    /// directory target is removed recursively, then the (now empty)
    /// directory itself. The root directory's contents can be removed this
    /// way, but the root itself stays.
    pub fn remove_recursive(&mut self, path: &str) -> FsResult<()> {
        let resolved = resolve(&self.disk, &self.directory_file, path)?;
        if !resolved.is_directory {
            return self.remove(path);
        }

        let file = OpenFile::new(&self.disk, resolved.sector);
        let table = Directory::fetch_from(&self.disk, &file);
        let names: Vec<String> = table.entries().map(|e| e.name()).collect();
        for name in names {
            let child = if path == "/" {
                format!("/{name}")
            } else {
                format!("{path}/{name}")
            };
            self.remove_recursive(&child)?;
        }
        if path == "/" {
            return Ok(());
        }
        self.remove(path)
    }

    /// Fetch the directory table `path` resolves to.
    pub fn read_directory(&self, path: &str) -> FsResult<Directory> {
        let resolved = resolve(&self.disk, &self.directory_file, path)?;
        if !resolved.is_directory {
            return Err(FsError::InvalidArgument(format!(
                "'{path}' is not a directory"
            )));
        }
        let file = OpenFile::new(&self.disk, resolved.sector);
        Ok(Directory::fetch_from(&self.disk, &file))
    }

    /// Print the entries of the directory at `path`.
    pub fn list(&self, path: &str) -> FsResult<()> {
        self.read_directory(path)?.list();
        Ok(())
    }

    /// Print the directory at `path` and everything under it, depth-first.
    pub fn recursive_list(&self, path: &str) -> FsResult<()> {
        self.read_directory(path)?.recursive_list(&self.disk);
        Ok(())
    }

    /// Dump everything: the free map, both well-known headers, and the
    /// whole directory tree.
    pub fn print(&self) {
        let free_map = self.fetch_free_map();
        println!(
            "Free map: {} of {NUM_SECTORS} sectors in use",
            free_map.num_set()
        );
        println!("Free map file header:");
        FileHeader::fetch_from(&self.disk, FREE_MAP_SECTOR).print(&self.disk, 1);
        println!("Root directory file header:");
        FileHeader::fetch_from(&self.disk, ROOT_DIRECTORY_SECTOR).print(&self.disk, 1);
        println!("Directory tree:");
        let root = Directory::fetch_from(&self.disk, &self.directory_file);
        root.recursive_list(&self.disk);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_fs() -> FileSystem {
        FileSystem::format(Disk::in_memory())
    }

    #[test]
    fn format_reserves_the_well_known_files() {
        let fs = fresh_fs();
        let map = fs.fetch_free_map();
        assert!(map.test(FREE_MAP_SECTOR));
        assert!(map.test(ROOT_DIRECTORY_SECTOR));
        // 2 headers + 4 sectors of free map + 8 sectors of directory.
        assert_eq!(map.num_clear(), NUM_SECTORS - 14);
        assert_eq!(fs.read_directory("/").unwrap().entries().count(), 0);
    }

    #[test]
    fn create_open_read_write() {
        let mut fs = fresh_fs();
        fs.create("/hello", 64).unwrap();
        let file = fs.open("/hello").unwrap();
        assert_eq!(file.length(), 64);
        file.write_at(fs.disk(), b"payload", 0);

        let again = fs.open("/hello").unwrap();
        let mut buf = [0u8; 7];
        again.read_at(fs.disk(), &mut buf, 0);
        assert_eq!(&buf, b"payload");
    }

    #[test]
    fn create_detects_duplicates_and_missing_parents() {
        let mut fs = fresh_fs();
        fs.create("/f", 10).unwrap();
        assert_eq!(fs.create("/f", 10), Err(FsError::AlreadyExists));
        assert_eq!(fs.create("/nodir/f", 10), Err(FsError::NotFound));
    }

    #[test]
    fn a_file_is_not_a_directory() {
        let mut fs = fresh_fs();
        fs.create("/f", 10).unwrap();
        assert_eq!(fs.create("/f/g", 10), Err(FsError::NotFound));
        assert!(matches!(fs.list("/f"), Err(FsError::InvalidArgument(_))));
    }

    #[test]
    fn nested_directories_resolve() {
        let mut fs = fresh_fs();
        fs.create_directory("/a").unwrap();
        fs.create_directory("/a/b").unwrap();
        fs.create("/a/b/f", 32).unwrap();

        assert!(fs.open("/a/b/f").is_ok());
        assert_eq!(fs.open("/a/b/g").err(), Some(FsError::NotFound));
        let table = fs.read_directory("/a/b").unwrap();
        assert_eq!(table.is_directory("f"), Some(false));
    }

    #[test]
    fn remove_frees_every_sector() {
        let mut fs = fresh_fs();
        let before = fs.num_free_sectors();
        fs.create("/f", 5000).unwrap();
        assert!(fs.num_free_sectors() < before);
        fs.remove("/f").unwrap();
        assert_eq!(fs.num_free_sectors(), before);
        assert_eq!(fs.open("/f").err(), Some(FsError::NotFound));
    }

    #[test]
    fn remove_refuses_a_populated_directory() {
        let mut fs = fresh_fs();
        fs.create_directory("/a").unwrap();
        fs.create("/a/f", 10).unwrap();
        assert!(matches!(fs.remove("/a"), Err(FsError::InvalidArgument(_))));
        // Empty it and the removal goes through.
        fs.remove("/a/f").unwrap();
        fs.remove("/a").unwrap();
        assert_eq!(fs.open("/a").err(), Some(FsError::NotFound));
    }

    #[test]
    fn mount_sees_what_format_wrote() {
        let disk = Disk::in_memory();
        let mut fs = FileSystem::format(disk);
        fs.create("/keep", 100).unwrap();
        fs.open("/keep").unwrap().write_at(fs.disk(), b"data", 0);

        // Re-mount over the same backing store.
        let FileSystem { disk, .. } = fs;
        let fs = FileSystem::mount(disk);
        let file = fs.open("/keep").unwrap();
        let mut buf = [0u8; 4];
        file.read_at(fs.disk(), &mut buf, 0);
        assert_eq!(&buf, b"data");
    }

    #[test]
    fn failed_create_writes_nothing() {
        let mut fs = fresh_fs();
        fs.create_directory("/a").unwrap();
        let image = fs.disk().snapshot();

        assert_eq!(fs.create("/a", 10), Err(FsError::AlreadyExists));
        assert_eq!(fs.create("/missing/f", 10), Err(FsError::NotFound));
        assert_eq!(fs.disk().snapshot(), image);
    }

    #[test]
    fn directory_full_rolls_back() {
        let mut fs = fresh_fs();
        for i in 0..directory::NUM_DIR_ENTRIES {
            fs.create(&format!("/f{i}"), 0).unwrap();
        }
        let image = fs.disk().snapshot();
        assert_eq!(fs.create("/straw", 0), Err(FsError::DirectoryFull));
        assert_eq!(fs.disk().snapshot(), image);
    }
}
