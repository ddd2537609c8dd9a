//! Ownership and permission translation between systems
//!
//! Source and destination machines rarely share a UID/GID universe, so
//! ownership is applied through a [`MetadataMapper`] holding translation
//! tables. The `preserve_unmapped` policy decides what happens to IDs
//! with no table entry: pass through unchanged, or drop (no ownership
//! change attempted).

use crate::provider::FileMeta;
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// UID/GID translation tables with a pass-through policy
#[derive(Debug, Clone)]
pub struct MetadataMapper {
    uid_map: HashMap<u32, u32>,
    gid_map: HashMap<u32, u32>,
    preserve_unmapped: bool,
}

impl Default for MetadataMapper {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataMapper {
    /// Empty tables, unmapped IDs preserved
    pub fn new() -> Self {
        Self {
            uid_map: HashMap::new(),
            gid_map: HashMap::new(),
            preserve_unmapped: true,
        }
    }

    /// Set the UID translation table
    pub fn with_uid_map(mut self, map: HashMap<u32, u32>) -> Self {
        self.uid_map = map;
        self
    }

    /// Set the GID translation table
    pub fn with_gid_map(mut self, map: HashMap<u32, u32>) -> Self {
        self.gid_map = map;
        self
    }

    /// Control whether untranslated IDs pass through unchanged
    pub fn preserve_unmapped(mut self, preserve: bool) -> Self {
        self.preserve_unmapped = preserve;
        self
    }

    /// Destination UID for a source UID; `None` means "do not chown"
    pub fn map_uid(&self, uid: u32) -> Option<u32> {
        match self.uid_map.get(&uid) {
            Some(&mapped) => Some(mapped),
            None if self.preserve_unmapped => Some(uid),
            None => None,
        }
    }

    /// Destination GID for a source GID; `None` means "do not chown"
    pub fn map_gid(&self, gid: u32) -> Option<u32> {
        match self.gid_map.get(&gid) {
            Some(&mapped) => Some(mapped),
            None if self.preserve_unmapped => Some(gid),
            None => None,
        }
    }
}

/// Apply POSIX permission bits and (mapped) ownership to a local path.
///
/// No-op when the metadata carries no Unix refinement. Errors are
/// returned so callers can decide; transfer paths swallow them because
/// metadata application is best-effort.
#[cfg(unix)]
pub fn apply_metadata(
    path: &Path,
    meta: &FileMeta,
    mapper: Option<&MetadataMapper>,
) -> std::io::Result<()> {
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    let Some(unix) = meta.unix else {
        return Ok(());
    };

    if unix.mode != 0 {
        fs::set_permissions(path, fs::Permissions::from_mode(unix.mode))?;
    }

    if let Some(mapper) = mapper {
        match (mapper.map_uid(unix.uid), mapper.map_gid(unix.gid)) {
            (Some(uid), Some(gid)) => {
                std::os::unix::fs::chown(path, Some(uid), Some(gid))?;
            }
            _ => {
                debug!(path = %path.display(), "ownership dropped by mapper policy");
            }
        }
    }

    Ok(())
}

#[cfg(not(unix))]
pub fn apply_metadata(
    _path: &Path,
    _meta: &FileMeta,
    _mapper: Option<&MetadataMapper>,
) -> std::io::Result<()> {
    Ok(())
}
