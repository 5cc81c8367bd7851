//! Local filesystem backend.

use converge::{FileMeta, FileSystem, HostError};
use std::fs;
use std::io;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};

/// Filesystem of the machine we run on
///
/// Writes go through a temporary sibling file and a rename, so readers never
/// see a half-written config. An existing file keeps its mode and owner.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFs;

fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.nodeprep-{}", std::process::id()))
}

/// Not-found maps to `None`, everything else is an error
fn optional<T>(path: &Path, result: io::Result<T>) -> Result<Option<T>, HostError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(HostError::io(path, e)),
    }
}

impl FileSystem for LocalFs {
    fn read(&self, path: &Path) -> Result<Option<Vec<u8>>, HostError> {
        optional(path, fs::read(path))
    }

    fn write(&self, path: &Path, content: &[u8]) -> Result<(), HostError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| HostError::io(parent, e))?;
        }

        let existing = optional(path, fs::metadata(path))?;
        let temp = temp_sibling(path);
        let result = fs::write(&temp, content)
            .and_then(|()| match &existing {
                Some(meta) => {
                    fs::set_permissions(&temp, meta.permissions())?;
                    let fresh = fs::metadata(&temp)?;
                    if (fresh.uid(), fresh.gid()) == (meta.uid(), meta.gid()) {
                        return Ok(());
                    }
                    std::os::unix::fs::chown(&temp, Some(meta.uid()), Some(meta.gid()))
                }
                None => Ok(()),
            })
            .and_then(|()| fs::rename(&temp, path));

        if let Err(e) = result {
            let _ = fs::remove_file(&temp);
            return Err(HostError::io(path, e));
        }
        Ok(())
    }

    fn stat(&self, path: &Path) -> Result<Option<FileMeta>, HostError> {
        let Some(meta) = optional(path, fs::metadata(path))? else {
            return Ok(None);
        };
        Ok(Some(FileMeta {
            mode: meta.permissions().mode() & 0o7777,
            uid: meta.uid(),
            gid: meta.gid(),
            modified: meta.modified().map_err(|e| HostError::io(path, e))?,
        }))
    }

    fn set_mode(&self, path: &Path, mode: u32) -> Result<(), HostError> {
        fs::set_permissions(path, fs::Permissions::from_mode(mode)).map_err(|e| HostError::io(path, e))
    }

    fn set_owner(&self, path: &Path, uid: Option<u32>, gid: Option<u32>) -> Result<(), HostError> {
        std::os::unix::fs::chown(path, uid, gid).map_err(|e| HostError::io(path, e))
    }

    fn remove(&self, path: &Path) -> Result<bool, HostError> {
        Ok(optional(path, fs::remove_file(path))?.is_some())
    }
}
