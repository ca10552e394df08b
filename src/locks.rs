//! Advisory whole-file locks on a sidecar `.lock` file.
//!
//! The lock only serializes processes that take it before touching the document.
//! A process writing the document directly is not stopped by it.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Sidecar lock path: the document path with its extension replaced by `lock`.
pub fn lock_path_for(document: &Path) -> PathBuf {
    document.with_extension("lock")
}

/// Held exclusive lock. Dropping the guard releases it; the file stays on disk.
#[derive(Debug)]
pub struct FileLock {
    path: PathBuf,
    file: File,
}

impl FileLock {
    /// Blocks until the exclusive lock on `path` is held.
    pub fn acquire(path: &Path) -> Result<Self, LockError> {
        let file = open_lock_file(path)?;
        file.lock_exclusive().map_err(|source| LockError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(lock = %path.display(), "lock acquired");
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    /// Non-blocking probe. `Ok(None)` means another holder has it.
    pub fn try_acquire(path: &Path) -> Result<Option<Self>, LockError> {
        let file = open_lock_file(path)?;
        match file.try_lock_exclusive() {
            Ok(()) => Ok(Some(Self {
                path: path.to_path_buf(),
                file,
            })),
            Err(err) if err.kind() == fs2::lock_contended_error().kind() => Ok(None),
            Err(source) => Err(LockError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
        tracing::debug!(lock = %self.path.display(), "lock released");
    }
}

fn open_lock_file(path: &Path) -> Result<File, LockError> {
    let to_lock_error = |source| LockError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(to_lock_error)?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(to_lock_error)
}
