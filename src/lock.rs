//! Exclusive provisioning lock
//!
//! Two provisioning runs in the same working directory would race on the
//! extraction tree and the target path, so each run holds a non-blocking
//! `flock` on `.engine-provision/provision.lock` for its whole duration.
//! The kernel releases the lock when the file is closed, including on crash.

use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{ProvisionError, Result};

/// Held lock; released on drop
pub struct ProvisionLock {
    path: PathBuf,
    _lock: Flock<File>,
}

impl ProvisionLock {
    /// Acquire the lock or fail immediately if another run holds it
    pub fn acquire(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .map_err(|e| {
                ProvisionError::lock(format!("cannot open lock file {}: {}", path.display(), e))
            })?;

        let mut lock = match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            Ok(lock) => lock,
            Err((_, Errno::EWOULDBLOCK)) => {
                return Err(ProvisionError::lock(format!(
                    "another provisioning run is active ({})",
                    path.display()
                )));
            }
            Err((_, errno)) => {
                return Err(ProvisionError::lock(format!(
                    "cannot lock {}: {}",
                    path.display(),
                    errno
                )));
            }
        };

        // Holder PID is informational only; failures do not matter
        let _ = lock.set_len(0);
        let _ = writeln!(*lock, "{}", std::process::id());

        debug!(path = %path.display(), "provisioning lock acquired");
        Ok(Self {
            path: path.to_path_buf(),
            _lock: lock,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
