//! Scan node: observe the repositories under the configured root.

use std::path::Path;

use tracing::{info, instrument};

use crate::core::state::{RunPhase, StatePatch};
use crate::io::scan::VcsScanner;

#[instrument(skip_all, fields(root = %repos_root.display()))]
pub fn run(scanner: &dyn VcsScanner, repos_root: &Path) -> StatePatch {
    let repos = scanner.scan(repos_root);
    let failed = repos
        .values()
        .filter(|repo| repo.scan_error.is_some())
        .count();
    info!(repos = repos.len(), failed, "scan finished");
    StatePatch {
        repos: Some(repos),
        phase: Some(RunPhase::Running),
        ..StatePatch::default()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::core::state::{RepoInfo, RunState};
    use crate::test_support::StaticScanner;

    #[test]
    fn records_repos_and_marks_the_run_running() {
        let mut repos = BTreeMap::new();
        repos.insert(
            "repo-a".to_string(),
            RepoInfo {
                path: "/tmp/repo-a".to_string(),
                branch: Some("main".to_string()),
                ..RepoInfo::default()
            },
        );
        let scanner = StaticScanner::new(repos);

        let mut state = RunState::new("run-1", false);
        state.apply(run(&scanner, Path::new("/tmp")));

        assert_eq!(state.phase, RunPhase::Running);
        assert!(state.repos.contains_key("repo-a"));
    }
}
