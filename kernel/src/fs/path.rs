//! Absolute-path resolution over nested directory tables.

use machine::disk::Disk;

use crate::fs::directory::Directory;
use crate::fs::error::{FsError, FsResult};
use crate::fs::openfile::OpenFile;
use crate::fs::ROOT_DIRECTORY_SECTOR;

/// Where a resolved path landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolved {
    /// Sector holding the entity's file header.
    pub sector: u32,
    /// Whether the entity is a directory.
    pub is_directory: bool,
}

/// Resolve an absolute path to the sector of the named entity's header,
/// walking nested directory tables from the root.
///
/// `"/"` resolves to the root directory itself. Every non-final component
/// must name a directory; the final component may name either kind.
pub fn resolve(disk: &Disk, root_dir_file: &OpenFile, path: &str) -> FsResult<Resolved> {
    check_absolute(path)?;
    if path == "/" {
        return Ok(Resolved {
            sector: ROOT_DIRECTORY_SECTOR,
            is_directory: true,
        });
    }

    let mut dir = Directory::fetch_from(disk, root_dir_file);
    let mut components = path[1..].split('/').peekable();
    loop {
        let component = components.next().expect("non-root path has a component");
        if component.is_empty() {
            return Err(FsError::InvalidArgument(format!(
                "empty component in path '{path}'"
            )));
        }
        let Some(sector) = dir.find(component) else {
            return Err(FsError::NotFound);
        };
        let is_directory = dir.is_directory(component).unwrap();
        if components.peek().is_none() {
            return Ok(Resolved { sector, is_directory });
        }
        if !is_directory {
            return Err(FsError::NotFound);
        }
        let file = OpenFile::new(disk, sector);
        dir = Directory::fetch_from(disk, &file);
    }
}

/// Split an absolute path into its parent directory and leaf name, so that
/// create/remove can load the parent table and operate on the leaf:
/// `"/a/b/f"` → `("/a/b", "f")`, `"/f"` → `("/", "f")`.
pub fn split_parent(path: &str) -> FsResult<(&str, &str)> {
    check_absolute(path)?;
    if path == "/" {
        return Err(FsError::InvalidArgument(
            "the root directory has no parent".into(),
        ));
    }
    let split = path.rfind('/').expect("absolute path contains '/'");
    let parent = if split == 0 { "/" } else { &path[..split] };
    let leaf = &path[split + 1..];
    if leaf.is_empty() {
        return Err(FsError::InvalidArgument(format!(
            "path '{path}' has an empty leaf name"
        )));
    }
    Ok((parent, leaf))
}

fn check_absolute(path: &str) -> FsResult<()> {
    if path.is_empty() || !path.starts_with('/') {
        return Err(FsError::InvalidArgument(format!(
            "path '{path}' is not absolute"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_parent_handles_root_children_and_nesting() {
        assert_eq!(split_parent("/f").unwrap(), ("/", "f"));
        assert_eq!(split_parent("/a/b/f").unwrap(), ("/a/b", "f"));
    }

    #[test]
    fn split_parent_rejects_malformed_paths() {
        assert!(matches!(split_parent(""), Err(FsError::InvalidArgument(_))));
        assert!(matches!(split_parent("f"), Err(FsError::InvalidArgument(_))));
        assert!(matches!(split_parent("/"), Err(FsError::InvalidArgument(_))));
        assert!(matches!(split_parent("/a/"), Err(FsError::InvalidArgument(_))));
    }
}
