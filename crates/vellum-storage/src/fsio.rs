use std::{
    fs,
    io::{ErrorKind, Write},
    path::Path,
};

use tempfile::NamedTempFile;
use vellum_core::storage::StorageError;

/// Write `bytes` to `path` via a temp file in the same directory and a rename,
/// so readers see either the old content or the new one, never a partial write.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StorageError> {
    let parent = path.parent().ok_or_else(|| StorageError::Write {
        reason: "invalid storage path".to_string(),
    })?;

    let mut tmp = NamedTempFile::new_in(parent).map_err(write_err)?;
    tmp.write_all(bytes).map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}

/// Read a whole file; `None` when it does not exist.
pub(crate) fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, StorageError> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(read_err(err)),
    }
}

/// Remove a file, treating "already gone" as success. Returns whether it existed.
pub(crate) fn remove_if_exists(path: &Path) -> Result<bool, StorageError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
        Err(err) => Err(write_err(err)),
    }
}

pub(crate) fn write_err<E: ToString>(err: E) -> StorageError {
    StorageError::Write {
        reason: err.to_string(),
    }
}

pub(crate) fn read_err<E: ToString>(err: E) -> StorageError {
    StorageError::Read {
        reason: err.to_string(),
    }
}
