//! Single-flight lock for the watchdog.
//!
//! Presence-only: the lock is held while the file exists. `create_new` makes
//! acquisition atomic, and the guard removes the file on drop. The pid and
//! timestamp inside are for operators staring at a stuck deployment, not for
//! the code.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};

pub struct LockGuard {
    path: PathBuf,
}

impl LockGuard {
    /// Try to take the lock. `Ok(None)` means another instance holds it.
    pub fn acquire(path: &Path, now_epoch: i64) -> Result<Option<Self>> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create directory {}", parent.display()))?;
        }
        match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(mut file) => {
                let contents = format!("pid = {}\nacquired_at = {now_epoch}\n", std::process::id());
                file.write_all(contents.as_bytes())
                    .with_context(|| format!("write lock {}", path.display()))?;
                debug!(path = %path.display(), "lock acquired");
                Ok(Some(Self {
                    path: path.to_path_buf(),
                }))
            }
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => Ok(None),
            Err(err) => {
                Err(err).with_context(|| format!("create lock {}", path.display()))
            }
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), err = %err, "could not remove lock file");
        }
    }
}
