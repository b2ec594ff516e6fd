//! Task plans stored in `plan.toml`.
//!
//! A plan says what to do; the scan says which repositories exist. The
//! planner crosses the two into a deterministic work item list: plan order
//! first, repository name order within a task.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::state::{RepoInfo, WorkItem};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Plan {
    pub tasks: Vec<PlanTask>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlanTask {
    pub id: String,

    /// Regex over repository names this task applies to.
    #[serde(default = "default_repo_selector")]
    pub repo_selector: String,

    pub action: String,
    pub message: String,

    /// Window title pattern overriding the deployment default.
    #[serde(default)]
    pub target: Option<String>,

    /// How many trailing lines the harvest step copies.
    #[serde(default = "default_copy_last_n")]
    pub copy_last_n: u32,
}

fn default_repo_selector() -> String {
    ".*".to_string()
}

fn default_copy_last_n() -> u32 {
    10
}

impl Plan {
    pub fn validate(&self) -> Result<()> {
        let mut seen = BTreeMap::new();
        for task in &self.tasks {
            if task.id.trim().is_empty() {
                return Err(anyhow!("task id must not be empty"));
            }
            if task.action.trim().is_empty() {
                return Err(anyhow!("task '{}' has an empty action", task.id));
            }
            if seen.insert(task.id.clone(), ()).is_some() {
                return Err(anyhow!("duplicate task id '{}'", task.id));
            }
        }
        Ok(())
    }
}

/// Load a plan from a TOML file.
///
/// A missing file is an empty plan; the run then idles through cleanly.
pub fn load_plan(path: &Path) -> Result<Plan> {
    if !path.exists() {
        debug!(path = %path.display(), "no plan file, using empty plan");
        return Ok(Plan::default());
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let plan: Plan =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    plan.validate()?;
    Ok(plan)
}

/// Cross plan tasks with scanned repositories.
///
/// Tasks keep their plan order; within a task, repositories are visited in
/// name order. A task whose selector does not compile is skipped with a
/// warning rather than failing the whole plan.
pub fn derive_work_items(plan: &Plan, repos: &BTreeMap<String, RepoInfo>) -> Vec<WorkItem> {
    let mut items = Vec::new();
    for task in &plan.tasks {
        let selector = match Regex::new(&task.repo_selector) {
            Ok(selector) => selector,
            Err(err) => {
                warn!(task = %task.id, err = %err, "invalid repo_selector, skipping task");
                continue;
            }
        };
        for repo_name in repos.keys() {
            if !selector.is_match(repo_name) {
                continue;
            }
            items.push(WorkItem {
                task_id: task.id.clone(),
                repo_name: repo_name.clone(),
                action: task.action.clone(),
                message: task.message.clone(),
                target: task.target.clone(),
                copy_last_n: task.copy_last_n,
            });
        }
    }
    debug!(tasks = plan.tasks.len(), repos = repos.len(), items = items.len(), "derived work items");
    items
}
