//! Read-only git probes for the repository scan.
//!
//! The pilot never writes to a repository, so there is no porcelain layer
//! here: scanning shells out to `git` for exactly two facts per repo.

use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};

/// Current branch name, erroring on a detached or unborn HEAD.
#[instrument(skip_all, fields(workdir = %workdir.display()))]
pub fn current_branch(workdir: &Path) -> Result<String> {
    let name = capture(workdir, &["rev-parse", "--abbrev-ref", "HEAD"])?;
    if name == "HEAD" {
        warn!("detached HEAD");
        return Err(anyhow!("detached HEAD"));
    }
    debug!(branch = %name, "current branch");
    Ok(name)
}

/// HEAD SHA truncated to `len` characters.
pub fn head_short_sha(workdir: &Path, len: usize) -> Result<String> {
    let arg = format!("--short={len}");
    capture(workdir, &["rev-parse", &arg, "HEAD"])
}

fn capture(workdir: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(workdir)
        .output()
        .with_context(|| format!("spawn git {}", args.join(" ")))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!("git {} failed: {}", args.join(" "), stderr.trim()));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}
