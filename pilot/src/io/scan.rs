//! Workspace scanning: enumerate git repositories under a root directory.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use tracing::{debug, instrument, warn};

use crate::core::state::RepoInfo;
use crate::io::git;

const HEAD_SHA_LEN: usize = 8;

/// Source of repository facts for the scan node.
pub trait VcsScanner {
    /// Enumerate repositories under `root`, keyed by directory name.
    ///
    /// Scanning is best-effort: a repository that cannot be inspected is
    /// still listed, with the failure recorded in `scan_error`.
    fn scan(&self, root: &Path) -> BTreeMap<String, RepoInfo>;
}

/// Scanner that treats every child directory containing `.git` as a repo.
pub struct GitScanner;

impl VcsScanner for GitScanner {
    #[instrument(skip_all, fields(root = %root.display()))]
    fn scan(&self, root: &Path) -> BTreeMap<String, RepoInfo> {
        let mut repos = BTreeMap::new();
        let entries = match fs::read_dir(root) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(root = %root.display(), err = %err, "cannot read repos root");
                return repos;
            }
        };
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!(err = %err, "skipping unreadable directory entry");
                    continue;
                }
            };
            let path = entry.path();
            if !path.is_dir() || !path.join(".git").exists() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            repos.insert(name, inspect(&path));
        }
        debug!(count = repos.len(), "scan complete");
        repos
    }
}

fn inspect(path: &Path) -> RepoInfo {
    let mut info = RepoInfo {
        path: path.display().to_string(),
        ..RepoInfo::default()
    };
    match git::current_branch(path) {
        Ok(branch) => info.branch = Some(branch),
        Err(err) => {
            info.scan_error = Some(format!("{err:#}"));
            return info;
        }
    }
    match git::head_short_sha(path, HEAD_SHA_LEN) {
        Ok(head) => info.head = Some(head),
        Err(err) => info.scan_error = Some(format!("{err:#}")),
    }
    info
}
