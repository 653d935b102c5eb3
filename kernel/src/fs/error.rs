//! Recoverable file-system errors.
//!
//! Everything here is surfaced to the caller and leaves the disk image
//! untouched. Fatal conditions — a failed host I/O on the backing image,
//! or a broken invariant such as a double-freed sector — panic instead.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FsError {
    /// Path resolution failed.
    #[error("no such file or directory")]
    NotFound,

    /// Name collision on create.
    #[error("file already exists")]
    AlreadyExists,

    /// The free-sector map is exhausted.
    #[error("out of disk space")]
    OutOfSpace,

    /// The fixed-capacity directory table has no free entry.
    #[error("directory is full")]
    DirectoryFull,

    /// Empty or malformed path, or an operation the target cannot support.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

pub type FsResult<T> = Result<T, FsError>;
