//! Single-instance lock and readiness marker.

use anyhow::{anyhow, Context, Result};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Held for the lifetime of the daemon. Dropping it removes the lock file and
/// the ready marker.
#[derive(Debug)]
pub struct InstanceLock {
    lock_file: PathBuf,
    ready_file: Option<PathBuf>,
}

impl InstanceLock {
    /// Creates the lock file exclusively, writing the current PID into it.
    pub fn acquire(lock_file: &Path) -> Result<Self> {
        let mut file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(lock_file)
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                let holder = fs::read_to_string(lock_file).unwrap_or_default();
                return Err(anyhow!(
                    "Another instance is already running (PID {}). \
                     Delete {} if it is stale.",
                    holder.trim(),
                    lock_file.display()
                ));
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to create {}", lock_file.display()))
            }
        };

        write!(file, "{}", std::process::id())?;
        Ok(Self {
            lock_file: lock_file.to_path_buf(),
            ready_file: None,
        })
    }

    /// Signals that startup checks passed.
    pub fn mark_ready(&mut self, ready_file: &Path) -> Result<()> {
        fs::write(ready_file, std::process::id().to_string())
            .with_context(|| format!("Failed to write {}", ready_file.display()))?;
        self.ready_file = Some(ready_file.to_path_buf());
        Ok(())
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        if let Some(ready) = &self.ready_file {
            let _ = fs::remove_file(ready);
        }
        let _ = fs::remove_file(&self.lock_file);
    }
}

/// True while some daemon holds the lock in `lock_file`.
pub fn is_locked(lock_file: &Path) -> bool {
    lock_file.exists()
}
