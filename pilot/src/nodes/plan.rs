//! Plan node: cross the task plan with the scanned repositories.

use tracing::{info, instrument};

use crate::core::state::{RunState, StatePatch};
use crate::io::plan::{Plan, derive_work_items};

#[instrument(skip_all, fields(tasks = plan.tasks.len()))]
pub fn run(plan: &Plan, state: &RunState) -> StatePatch {
    let items = derive_work_items(plan, &state.repos);
    info!(items = items.len(), "plan finished");
    StatePatch {
        work_items: Some(items),
        ..StatePatch::default()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::core::state::RepoInfo;
    use crate::io::plan::PlanTask;

    #[test]
    fn derives_work_items_from_state_repos() {
        let plan = Plan {
            tasks: vec![PlanTask {
                id: "status".to_string(),
                repo_selector: ".*".to_string(),
                action: "post_status".to_string(),
                message: "nightly".to_string(),
                target: None,
                copy_last_n: 10,
            }],
        };
        let mut state = RunState::new("run-1", false);
        let mut repos = BTreeMap::new();
        repos.insert(
            "repo-a".to_string(),
            RepoInfo {
                path: "/tmp/repo-a".to_string(),
                ..RepoInfo::default()
            },
        );
        state.apply(StatePatch {
            repos: Some(repos),
            ..StatePatch::default()
        });

        let patch = run(&plan, &state);
        state.apply(patch);

        assert_eq!(state.work_items.len(), 1);
        assert_eq!(state.work_items[0].repo_name, "repo-a");
    }
}
