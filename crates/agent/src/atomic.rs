//! Atomic file replacement for session and state files.
//!
//! Writes go to a temp file in the same directory, are fsynced, then
//! renamed over the destination. Readers observe either the old contents
//! or the new contents, never a torn write.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use tabletalk_core::errors::PersistError;

pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), PersistError> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)
        .map_err(|source| PersistError::Write { path: parent.to_path_buf(), source })?;

    let tmp = path.with_extension("tmp");
    let mut file = File::create(&tmp)
        .map_err(|source| PersistError::Write { path: tmp.clone(), source })?;
    file.write_all(contents)
        .map_err(|source| PersistError::Write { path: tmp.clone(), source })?;
    file.sync_all()
        .map_err(|source| PersistError::Write { path: tmp.clone(), source })?;
    drop(file);

    fs::rename(&tmp, path).map_err(|source| {
        let _ = fs::remove_file(&tmp);
        PersistError::Replace { path: path.to_path_buf(), source }
    })
}

/// Atomic write with a plain-write fallback. If the rename path fails
/// (exotic filesystems), fall back to writing in place; only report an
/// error when both attempts fail.
pub fn write_atomic_or_plain(path: &Path, contents: &[u8]) -> Result<(), PersistError> {
    match write_atomic(path, contents) {
        Ok(()) => Ok(()),
        Err(atomic_error) => {
            tracing::warn!(
                path = %path.display(),
                error = %atomic_error,
                "atomic replace failed; falling back to plain write"
            );
            fs::write(path, contents)
                .map_err(|source| PersistError::Write { path: path.to_path_buf(), source })
        }
    }
}
