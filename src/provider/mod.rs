//! Storage provider abstraction
//!
//! A provider presents any storage system as a uniform hierarchical
//! namespace with streamable reads and writes. Two backends ship with
//! the engine:
//!
//! - [`LocalProvider`]: POSIX filesystems, optionally rooted at a base path
//! - [`ObjectProvider`]: S3-compatible object stores (feature `s3`)
//!
//! All operations take a [`CancelToken`] scope and return a cancellation
//! error promptly when the scope fires.

pub mod local;
pub mod metadata;
#[cfg(feature = "s3")]
pub mod object;

pub use local::LocalProvider;
pub use metadata::MetadataMapper;
#[cfg(feature = "s3")]
pub use object::ObjectProvider;

use crate::engine::cancel::CancelToken;
use crate::error::ProviderResult;
use std::io::{Read, Write};
use std::time::SystemTime;

/// Portable file metadata shared by all providers
///
/// Providers populate the richest record they can produce; the optional
/// [`UnixMeta`] refinement carries POSIX ownership and permissions, and
/// consumers probe for it by matching on `unix`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMeta {
    /// Basename of the entry
    pub name: String,

    /// Size in bytes (0 for directories)
    pub size: u64,

    /// True for directories (including synthetic object-store prefixes)
    pub is_dir: bool,

    /// Modification time, when the backend reports one
    pub mtime: Option<SystemTime>,

    /// POSIX ownership and permission bits, when the backend has them
    pub unix: Option<UnixMeta>,
}

/// POSIX refinement of [`FileMeta`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnixMeta {
    pub uid: u32,
    pub gid: u32,
    /// Permission bits (e.g. 0o644); 0 means "do not apply"
    pub mode: u32,
}

impl FileMeta {
    /// Metadata for a regular file
    pub fn file(name: impl Into<String>, size: u64, mtime: Option<SystemTime>) -> Self {
        Self {
            name: name.into(),
            size,
            is_dir: false,
            mtime,
            unix: None,
        }
    }

    /// Metadata for a directory
    pub fn dir(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size: 0,
            is_dir: true,
            mtime: None,
            unix: None,
        }
    }

    /// Attach POSIX ownership and permissions
    pub fn with_unix(mut self, unix: UnixMeta) -> Self {
        self.unix = Some(unix);
        self
    }
}

/// Destination write stream
///
/// `close` must (a) durably commit the bytes written, (b) apply `mtime`
/// when the metadata carries one, and (c) apply POSIX permission bits
/// and mapped ownership for Unix metadata. Permission and ownership
/// failures are swallowed - they must not fail the transfer.
pub trait WriteStream: Write + Send {
    fn close(self: Box<Self>) -> ProviderResult<()>;
}

/// Polymorphic storage backend
///
/// Provider handles are shared read-only by every worker; implementations
/// must be safe to call concurrently.
pub trait Provider: Send + Sync {
    /// Metadata for the entry at `path`; `ProviderError::NotFound` if absent
    fn stat(&self, cancel: &CancelToken, path: &str) -> ProviderResult<FileMeta>;

    /// Immediate children of the directory at `path` (not recursive)
    fn list(&self, cancel: &CancelToken, path: &str) -> ProviderResult<Vec<FileMeta>>;

    /// Open a streaming read; the caller owns and drops the stream
    fn open_read(&self, cancel: &CancelToken, path: &str)
        -> ProviderResult<Box<dyn Read + Send>>;

    /// Open a streaming write, applying `metadata` on close
    fn open_write(
        &self,
        cancel: &CancelToken,
        path: &str,
        metadata: &FileMeta,
    ) -> ProviderResult<Box<dyn WriteStream>>;
}
