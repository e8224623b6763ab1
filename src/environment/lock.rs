//! Cross-process environment lock
//!
//! An exclusive advisory lock on `<target>.lock`. Workers started as
//! separate processes share no memory, so the lock file is the only thing
//! that serializes writes to a shared environment directory.

use fs2::FileExt;
use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::EnvironmentError;

/// Held exclusive lock; released when dropped
#[derive(Debug)]
pub struct EnvLock {
    file: File,
    path: PathBuf,
}

impl EnvLock {
    /// Lock file guarding `target`: the target path with `.lock` appended
    pub fn path_for(target: &Path) -> PathBuf {
        let mut name: OsString = target.as_os_str().to_owned();
        name.push(".lock");
        PathBuf::from(name)
    }

    /// Block until the lock guarding `target` is ours.
    ///
    /// Waiting happens on the blocking thread pool so other notebooks keep
    /// running on the async workers.
    pub async fn acquire(target: &Path) -> Result<Self, EnvironmentError> {
        let path = Self::path_for(target);
        let lock_path = path.clone();

        tokio::task::spawn_blocking(move || Self::acquire_blocking(lock_path))
            .await
            .map_err(|e| EnvironmentError::Lock {
                path,
                source: std::io::Error::new(std::io::ErrorKind::Other, e),
            })?
    }

    fn acquire_blocking(path: PathBuf) -> Result<Self, EnvironmentError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| EnvironmentError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|source| EnvironmentError::Lock {
                path: path.clone(),
                source,
            })?;

        debug!("Waiting for {}", path.display());
        FileExt::lock_exclusive(&file).map_err(|source| EnvironmentError::Lock {
            path: path.clone(),
            source,
        })?;
        debug!("Acquired {}", path.display());

        Ok(Self { file, path })
    }
}

impl Drop for EnvLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!("Failed to release {}: {}", self.path.display(), e);
        } else {
            debug!("Released {}", self.path.display());
        }
    }
}
