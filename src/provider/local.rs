//! Local POSIX filesystem provider
//!
//! Paths resolve under an optional base prefix; parent directories are
//! created on write. Metadata is applied *after* the content handle is
//! closed - POSIX updates mtime on write, so the timestamp has to go
//! last or the copy itself would clobber it.

use crate::engine::cancel::CancelToken;
use crate::error::{ProviderError, ProviderResult};
use crate::provider::metadata::{apply_metadata, MetadataMapper};
use crate::provider::{FileMeta, Provider, WriteStream};
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Provider for local (or locally mounted) filesystems
pub struct LocalProvider {
    base: Option<PathBuf>,
    mapper: Option<MetadataMapper>,
}

impl LocalProvider {
    /// Provider acting on absolute or cwd-relative paths directly
    pub fn new() -> Self {
        Self {
            base: None,
            mapper: None,
        }
    }

    /// Provider resolving every path under `base`
    pub fn rooted<P: Into<PathBuf>>(base: P) -> Self {
        Self {
            base: Some(base.into()),
            mapper: None,
        }
    }

    /// Apply ownership through `mapper` when closing write streams
    pub fn with_metadata_mapper(mut self, mapper: MetadataMapper) -> Self {
        self.mapper = Some(mapper);
        self
    }

    fn resolve(&self, path: &str) -> PathBuf {
        match &self.base {
            Some(base) => base.join(path.trim_start_matches('/')),
            None => PathBuf::from(path),
        }
    }

    fn meta_from_fs(path: &Path, info: &fs::Metadata) -> FileMeta {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());

        let mut meta = FileMeta {
            name,
            size: if info.is_dir() { 0 } else { info.len() },
            is_dir: info.is_dir(),
            mtime: info.modified().ok(),
            unix: None,
        };

        #[cfg(unix)]
        {
            use crate::provider::UnixMeta;
            use std::os::unix::fs::MetadataExt;
            meta.unix = Some(UnixMeta {
                uid: info.uid(),
                gid: info.gid(),
                mode: info.mode() & 0o7777,
            });
        }

        meta
    }

    fn check_cancel(cancel: &CancelToken) -> ProviderResult<()> {
        if cancel.is_cancelled() {
            return Err(ProviderError::Cancelled);
        }
        Ok(())
    }
}

impl Default for LocalProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl Provider for LocalProvider {
    fn stat(&self, cancel: &CancelToken, path: &str) -> ProviderResult<FileMeta> {
        Self::check_cancel(cancel)?;

        let full = self.resolve(path);
        let info = fs::metadata(&full).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                ProviderError::NotFound { path: path.into() }
            } else {
                ProviderError::Io(e)
            }
        })?;

        Ok(Self::meta_from_fs(&full, &info))
    }

    fn list(&self, cancel: &CancelToken, path: &str) -> ProviderResult<Vec<FileMeta>> {
        Self::check_cancel(cancel)?;

        let full = self.resolve(path);
        let mut entries = Vec::new();

        for entry in fs::read_dir(&full)? {
            let entry = entry?;
            // Skip entries that disappeared between readdir and stat
            let Ok(info) = entry.metadata() else {
                debug!(path = %entry.path().display(), "entry vanished during list");
                continue;
            };
            entries.push(Self::meta_from_fs(&entry.path(), &info));
        }

        Ok(entries)
    }

    fn open_read(
        &self,
        cancel: &CancelToken,
        path: &str,
    ) -> ProviderResult<Box<dyn Read + Send>> {
        Self::check_cancel(cancel)?;

        let full = self.resolve(path);
        let file = File::open(&full).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                ProviderError::NotFound { path: path.into() }
            } else {
                ProviderError::Io(e)
            }
        })?;
        Ok(Box::new(file))
    }

    fn open_write(
        &self,
        cancel: &CancelToken,
        path: &str,
        metadata: &FileMeta,
    ) -> ProviderResult<Box<dyn WriteStream>> {
        Self::check_cancel(cancel)?;

        let full = self.resolve(path);
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = File::create(&full)?;
        Ok(Box::new(LocalWriteStream {
            file: Some(file),
            path: full,
            metadata: metadata.clone(),
            mapper: self.mapper.clone(),
        }))
    }
}

/// Write stream applying metadata after the content close
struct LocalWriteStream {
    file: Option<File>,
    path: PathBuf,
    metadata: FileMeta,
    mapper: Option<MetadataMapper>,
}

impl Write for LocalWriteStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &mut self.file {
            Some(file) => file.write(buf),
            None => Err(io::Error::new(io::ErrorKind::Other, "stream closed")),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.file {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

impl WriteStream for LocalWriteStream {
    fn close(mut self: Box<Self>) -> ProviderResult<()> {
        if let Some(file) = self.file.take() {
            file.sync_all()?;
            drop(file);
        }

        // Permission and ownership failures must not fail the transfer
        if let Err(e) = apply_metadata(&self.path, &self.metadata, self.mapper.as_ref()) {
            debug!(path = %self.path.display(), error = %e, "metadata application failed");
        }

        // mtime last: every other touch above would bump it again
        if let Some(mtime) = self.metadata.mtime {
            let ft = filetime::FileTime::from_system_time(mtime);
            if let Err(e) = filetime::set_file_mtime(&self.path, ft) {
                debug!(path = %self.path.display(), error = %e, "mtime application failed");
            }
        }

        Ok(())
    }
}
