//! Liveness heartbeat consumed by the watchdog.
//!
//! The persist node rewrites this file at the end of every run. A missing,
//! stale, or unreadable heartbeat all mean the same thing to the watchdog:
//! the deployment is not visibly making progress.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Heartbeat {
    pub run_id: String,
    pub at: i64,
}

/// Read the heartbeat, treating anything unreadable as absent.
pub fn load_heartbeat(path: &Path) -> Option<Heartbeat> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return None,
        Err(err) => {
            warn!(path = %path.display(), err = %err, "cannot read heartbeat");
            return None;
        }
    };
    match serde_json::from_str(&contents) {
        Ok(heartbeat) => Some(heartbeat),
        Err(err) => {
            warn!(path = %path.display(), err = %err, "undecodable heartbeat");
            None
        }
    }
}

/// Atomically write the heartbeat (temp file + rename).
pub fn write_heartbeat(path: &Path, heartbeat: &Heartbeat) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("heartbeat path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let mut buf = serde_json::to_string_pretty(heartbeat).context("serialize heartbeat")?;
    buf.push('\n');
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, &buf)
        .with_context(|| format!("write temp heartbeat {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .with_context(|| format!("replace heartbeat {}", path.display()))?;
    Ok(())
}
