use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Key in `subagent_branches` under which the hidden snapshot ref is stored.
pub const WIP_SNAPSHOT: &str = "wip_snapshot";

fn default_base_branch() -> String {
    "main".into()
}

/// Git-aware task state tracking the branch and commits a unit of work
/// started from, plus any analysis branches derived from it.
/// Persisted as the `git_task_state` field of an extension's config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskState {
    pub task_id: String,
    pub task_description: String,
    /// Commit hash of the working branch at snapshot time. Set once at
    /// creation, never mutated.
    pub base_sha: String,
    /// Latest known position of the branch; refreshed on demand.
    pub current_sha: String,
    /// The branch the user remains on — snapshotting never checks this
    /// out elsewhere.
    pub branch_name: String,
    /// The branch this task is derived from. Defaults to `branch_name` at
    /// creation; older persisted records without the field read as "main".
    #[serde(default = "default_base_branch")]
    pub base_branch: String,
    pub created_at: DateTime<Local>,
    /// Label → git ref. The `"wip_snapshot"` entry, when present, points at
    /// the hidden snapshot ref and is preferred as the diff base. Re-creating
    /// a branch for a label overwrites the entry; the old ref is not cleaned
    /// up automatically.
    #[serde(default)]
    pub subagent_branches: BTreeMap<String, String>,
    /// Open-ended extension data.
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl TaskState {
    /// The hidden snapshot ref, if one was recorded at creation.
    pub fn wip_ref(&self) -> Option<&str> {
        self.subagent_branches.get(WIP_SNAPSHOT).map(String::as_str)
    }

    /// Baseline for diff and change-set computation: the hidden snapshot ref
    /// captures uncommitted/untracked state that `base_sha` alone cannot
    /// represent, so it is preferred whenever present. `base_sha` is the
    /// degraded fallback for states created without a snapshot or
    /// reconstructed from persisted JSON.
    pub fn diff_base(&self) -> &str {
        self.wip_ref().unwrap_or(&self.base_sha)
    }
}
