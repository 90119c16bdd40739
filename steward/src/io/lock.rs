//! Exclusive advisory file lock for reconcile passes.
//!
//! Backed by `flock(2)` through `fs2`, so the kernel drops the lock if the
//! holder dies. Acquisition never blocks: a held lock is reported immediately.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock {} is held by another process", path.display())]
    Held { path: PathBuf },
    #[error("lock {}: {err}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        err: std::io::Error,
    },
}

/// Held lock; released when dropped.
#[derive(Debug)]
pub struct LockGuard {
    file: File,
    path: PathBuf,
}

impl LockGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(err) = FileExt::unlock(&self.file) {
            warn!(path = %self.path.display(), err = %err, "failed to release lock");
        } else {
            debug!(path = %self.path.display(), "lock released");
        }
    }
}

/// Try to take the exclusive lock at `path` without blocking.
///
/// Each call opens a fresh file description, so a second acquisition from the
/// same process also fails with [`LockError::Held`].
pub fn try_acquire(path: &Path) -> Result<LockGuard, LockError> {
    let io_err = |err| LockError::Io {
        path: path.to_path_buf(),
        err,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(io_err)?;
    }
    // Do not truncate before holding the lock; the holder's pid lives in the file.
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .map_err(io_err)?;

    if let Err(err) = file.try_lock_exclusive() {
        if err.kind() == fs2::lock_contended_error().kind() {
            debug!(path = %path.display(), "lock contended");
            return Err(LockError::Held {
                path: path.to_path_buf(),
            });
        }
        return Err(io_err(err));
    }

    file.set_len(0).map_err(io_err)?;
    writeln!(file, "{}", std::process::id()).map_err(io_err)?;
    debug!(path = %path.display(), "lock acquired");
    Ok(LockGuard {
        file,
        path: path.to_path_buf(),
    })
}
