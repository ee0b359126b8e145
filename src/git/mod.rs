use anyhow::{Context, Result, anyhow, bail};
use chrono::Local;
use git2::build::CheckoutBuilder;
use git2::{BranchType, Repository, StatusOptions};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::task::{TaskState, WIP_SNAPSHOT};
use crate::wip::{self, SaveOutcome};

/// Current repository status, for the `status` command and validation.
#[derive(Debug)]
pub struct RepoStatus {
    pub branch: String,
    pub sha: String,
    pub is_clean: bool,
}

#[derive(Debug)]
pub struct WorktreeInfo {
    pub name: String,
    pub path: PathBuf,
    pub head: Option<String>,
}

/// Manages git snapshots, task branches, and diff computation for a task.
///
/// Snapshot creation is non-destructive: the working tree is captured onto a
/// hidden ref (`refs/wip/<branch>`) and the user's branch, HEAD, index, and
/// working tree are left untouched. The only operations that switch branches
/// are `update_task_state` (back to the task branch), `create_subagent_branch`
/// (onto the new analysis branch), and `cleanup_task_branch` (onto the base
/// branch).
pub struct GitTaskManager {
    repo: Repository,
}

impl std::fmt::Debug for GitTaskManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitTaskManager")
            .field("repo", &self.repo.path())
            .finish()
    }
}

fn generate_task_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

impl GitTaskManager {
    /// Discover the repository containing `dir`. This is the precondition
    /// probe: failing here means no mutation has happened.
    pub fn open(dir: &Path) -> Result<Self> {
        let repo = Repository::discover(dir)
            .with_context(|| format!("not a git repository: {}", dir.display()))?;
        Ok(Self { repo })
    }

    pub fn repo(&self) -> &Repository {
        &self.repo
    }

    // ---------------------------------------------------------------
    // Repository queries
    // ---------------------------------------------------------------

    pub fn current_branch(&self) -> Result<String> {
        let head = self.repo.head().context("reading HEAD")?;
        if !head.is_branch() {
            bail!("HEAD is detached; task snapshots require a checked-out branch");
        }
        Ok(head
            .shorthand()
            .context("branch name is not valid UTF-8")?
            .to_string())
    }

    pub fn head_sha(&self) -> Result<String> {
        Ok(self
            .repo
            .head()
            .context("reading HEAD")?
            .peel_to_commit()
            .context("peeling HEAD to commit")?
            .id()
            .to_string())
    }

    pub fn status(&self) -> Result<RepoStatus> {
        let mut opts = StatusOptions::new();
        opts.include_untracked(true).include_ignored(false);
        let statuses = self
            .repo
            .statuses(Some(&mut opts))
            .context("reading repository status")?;
        Ok(RepoStatus {
            branch: self.current_branch()?,
            sha: self.head_sha()?,
            is_clean: statuses.is_empty(),
        })
    }

    // ---------------------------------------------------------------
    // Snapshot lifecycle
    // ---------------------------------------------------------------

    /// Capture the working tree (tracked + untracked) onto the hidden
    /// snapshot ref and return a fresh `TaskState` anchored at the current
    /// branch tip. The user stays on their branch; `current_sha` equals
    /// `base_sha` because the snapshot coincides with "now".
    ///
    /// If capturing with untracked files fails, one retry without them is
    /// attempted before the failure surfaces.
    pub fn create_snapshot(
        &self,
        task_id: Option<String>,
        task_description: &str,
    ) -> Result<TaskState> {
        let branch_name = self.current_branch()?;
        let base_sha = self.head_sha()?;
        let task_id = task_id.unwrap_or_else(generate_task_id);
        let message = if task_description.is_empty() {
            format!("Task {task_id}")
        } else {
            format!("Task: {task_description}")
        };

        let outcome = match wip::save(&self.repo, &branch_name, &message, true) {
            Ok(outcome) => outcome,
            Err(err) => {
                warn!("snapshot with untracked files failed, retrying without: {err:#}");
                wip::save(&self.repo, &branch_name, &message, false)
                    .context("creating task snapshot")?
            }
        };
        match outcome {
            SaveOutcome::Created(oid) => debug!(%oid, branch = %branch_name, "snapshot created"),
            SaveOutcome::NoChanges => {
                debug!(branch = %branch_name, "working tree unchanged since last snapshot")
            }
        }

        let mut subagent_branches = BTreeMap::new();
        subagent_branches.insert(WIP_SNAPSHOT.to_string(), wip::ref_name(&branch_name));

        Ok(TaskState {
            task_id,
            task_description: task_description.to_string(),
            base_sha: base_sha.clone(),
            current_sha: base_sha,
            base_branch: branch_name.clone(),
            branch_name,
            created_at: Local::now(),
            subagent_branches,
            metadata: BTreeMap::new(),
        })
    }

    /// Refresh `current_sha` from the task branch tip, checking the branch
    /// out first if the repository is elsewhere.
    pub fn update_task_state(&self, state: &mut TaskState) -> Result<()> {
        if self.current_branch()? != state.branch_name {
            self.checkout_branch(&state.branch_name)?;
        }
        state.current_sha = self.head_sha()?;
        Ok(())
    }

    /// Create and check out `"<branch_name>/<label>"` for isolated analysis
    /// work. Unlike snapshotting, this switches the visible branch.
    pub fn create_subagent_branch(&self, state: &mut TaskState, label: &str) -> Result<String> {
        let name = format!("{}/{label}", state.branch_name);
        let target = self
            .repo
            .find_branch(&state.branch_name, BranchType::Local)
            .with_context(|| format!("finding branch {}", state.branch_name))?
            .into_reference()
            .peel_to_commit()
            .context("peeling branch to commit")?;
        self.repo
            .branch(&name, &target, false)
            .with_context(|| format!("creating branch {name}"))?;
        self.checkout_branch(&name)?;
        state.subagent_branches.insert(label.to_string(), name.clone());
        Ok(name)
    }

    /// Return to the base branch, optionally merging the task branch back
    /// and deleting it. Merge conflicts are fatal; a failed branch delete is
    /// reported in the returned warning list instead of blocking the caller.
    ///
    /// The hidden snapshot ref and any subagent branches are left in place;
    /// callers own their cleanup.
    pub fn cleanup_task_branch(
        &self,
        state: &TaskState,
        merge_back: bool,
        delete_branch: bool,
    ) -> Result<Vec<String>> {
        let mut warnings = Vec::new();

        self.checkout_branch(&state.base_branch)?;

        if merge_back {
            self.merge_branch(&state.branch_name)?;
        }

        if delete_branch {
            match self.repo.find_branch(&state.branch_name, BranchType::Local) {
                Ok(mut branch) => {
                    if let Err(err) = branch.delete() {
                        warnings.push(format!(
                            "failed to delete branch {}: {err}",
                            state.branch_name
                        ));
                    }
                }
                Err(err) => warnings.push(format!(
                    "branch {} not found for deletion: {err}",
                    state.branch_name
                )),
            }
        }

        for warning in &warnings {
            warn!("{warning}");
        }
        Ok(warnings)
    }

    fn checkout_branch(&self, name: &str) -> Result<()> {
        let reference = self
            .repo
            .find_branch(name, BranchType::Local)
            .with_context(|| format!("finding branch {name}"))?
            .into_reference();
        let commit = reference
            .peel_to_commit()
            .with_context(|| format!("peeling {name} to commit"))?;
        self.repo
            .checkout_tree(commit.as_object(), Some(CheckoutBuilder::new().safe()))
            .with_context(|| format!("checking out {name}"))?;
        let ref_name = reference.name().context("branch ref name is not UTF-8")?;
        self.repo
            .set_head(ref_name)
            .with_context(|| format!("switching HEAD to {name}"))?;
        Ok(())
    }

    fn merge_branch(&self, source: &str) -> Result<()> {
        let branch = self
            .repo
            .find_branch(source, BranchType::Local)
            .with_context(|| format!("finding branch {source}"))?;
        let annotated = self
            .repo
            .reference_to_annotated_commit(branch.get())
            .context("resolving merge source")?;
        let (analysis, _) = self
            .repo
            .merge_analysis(&[&annotated])
            .context("analyzing merge")?;

        if analysis.is_up_to_date() {
            return Ok(());
        }

        if analysis.is_fast_forward() {
            let target = annotated.id();
            let mut head_ref = self.repo.head().context("reading HEAD")?;
            head_ref
                .set_target(target, &format!("merge {source}: fast-forward"))
                .context("advancing branch")?;
            let commit = self.repo.find_commit(target).context("finding commit")?;
            self.repo
                .checkout_tree(commit.as_object(), Some(CheckoutBuilder::new().force()))
                .context("updating working tree")?;
            return Ok(());
        }

        self.repo
            .merge(&[&annotated], None, None)
            .with_context(|| format!("merging {source}"))?;
        let mut index = self.repo.index().context("opening index")?;
        if index.has_conflicts() {
            self.repo.cleanup_state().ok();
            bail!("merge of {source} produced conflicts; resolve manually");
        }
        let tree_oid = index.write_tree().context("writing merge tree")?;
        let tree = self.repo.find_tree(tree_oid).context("finding merge tree")?;
        let sig = self
            .repo
            .signature()
            .context("reading git signature (user.name / user.email)")?;
        let head_commit = self
            .repo
            .head()
            .and_then(|h| h.peel_to_commit())
            .context("reading HEAD commit")?;
        let source_commit = branch
            .into_reference()
            .peel_to_commit()
            .context("reading source commit")?;
        self.repo
            .commit(
                Some("HEAD"),
                &sig,
                &sig,
                &format!("Merge branch '{source}'"),
                &tree,
                &[&head_commit, &source_commit],
            )
            .context("creating merge commit")?;
        self.repo.cleanup_state().context("clearing merge state")?;
        Ok(())
    }

    // ---------------------------------------------------------------
    // Diff / change-set accessors
    // ---------------------------------------------------------------

    /// Baseline for diffs: `TaskState::diff_base`, demoted to `base_sha`
    /// when the recorded snapshot ref no longer resolves (e.g. a state
    /// reconstructed from persisted JSON after the ref was garbage-collected).
    fn baseline(&self, state: &TaskState) -> String {
        let base = state.diff_base();
        if base != state.base_sha && self.repo.revparse_single(base).is_err() {
            debug!(base, "snapshot ref no longer resolves, falling back to base sha");
            return state.base_sha.clone();
        }
        base.to_string()
    }

    fn resolve_tree(&self, refish: &str) -> Result<git2::Tree<'_>> {
        self.repo
            .revparse_single(refish)
            .with_context(|| format!("resolving {refish}"))?
            .peel(git2::ObjectType::Tree)
            .with_context(|| format!("peeling {refish} to tree"))?
            .into_tree()
            .map_err(|_| anyhow!("{refish} is not a tree"))
    }

    fn diff_from_baseline(&self, state: &TaskState, target: Option<&str>) -> Result<git2::Diff<'_>> {
        let base = self.baseline(state);
        let target = target.unwrap_or("HEAD");
        let base_tree = self.resolve_tree(&base)?;
        let target_tree = self.resolve_tree(target)?;
        self.repo
            .diff_tree_to_tree(Some(&base_tree), Some(&target_tree), None)
            .with_context(|| format!("diffing {base}..{target}"))
    }

    /// Unified-diff text from the snapshot baseline to `target` (HEAD when
    /// not given).
    pub fn get_task_diff(&self, state: &TaskState, target: Option<&str>) -> Result<String> {
        let diff = self.diff_from_baseline(state, target)?;
        let mut text = String::new();
        diff.print(git2::DiffFormat::Patch, |_delta, _hunk, line| {
            match line.origin() {
                '+' | '-' | ' ' => text.push(line.origin()),
                _ => {}
            }
            if let Ok(content) = std::str::from_utf8(line.content()) {
                text.push_str(content);
            }
            true
        })
        .context("rendering diff")?;
        Ok(text)
    }

    /// Deduplicated, order-preserving list of file paths changed between the
    /// snapshot baseline and `target`. Never contains empty entries.
    pub fn get_changed_files(&self, state: &TaskState, target: Option<&str>) -> Result<Vec<String>> {
        let diff = self.diff_from_baseline(state, target)?;
        let mut files: Vec<String> = Vec::new();
        for delta in diff.deltas() {
            let path = delta
                .new_file()
                .path()
                .or_else(|| delta.old_file().path());
            if let Some(path) = path {
                let path = path.to_string_lossy().into_owned();
                if !path.is_empty() && !files.contains(&path) {
                    files.push(path);
                }
            }
        }
        Ok(files)
    }

    // ---------------------------------------------------------------
    // Worktree helpers
    // ---------------------------------------------------------------

    /// Create a worktree at `path`, checked out to `branch_name` (created
    /// from `base_ref`, default HEAD, if it doesn't exist). When no branch
    /// name is given, the worktree directory name is used.
    pub fn create_worktree(
        &self,
        path: &Path,
        branch_name: Option<&str>,
        base_ref: Option<&str>,
    ) -> Result<PathBuf> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .context("worktree path has no usable name")?;
        let branch_name = branch_name.unwrap_or(name);

        let branch = match self.repo.find_branch(branch_name, BranchType::Local) {
            Ok(branch) => branch,
            Err(_) => {
                let base = base_ref.unwrap_or("HEAD");
                let commit = self
                    .repo
                    .revparse_single(base)
                    .with_context(|| format!("resolving {base}"))?
                    .peel_to_commit()
                    .with_context(|| format!("peeling {base} to commit"))?;
                self.repo
                    .branch(branch_name, &commit, false)
                    .with_context(|| format!("creating branch {branch_name}"))?
            }
        };
        let reference = branch.into_reference();

        let mut opts = git2::WorktreeAddOptions::new();
        opts.reference(Some(&reference));
        let worktree = self
            .repo
            .worktree(name, path, Some(&opts))
            .with_context(|| format!("adding worktree at {}", path.display()))?;
        Ok(worktree.path().to_path_buf())
    }

    /// Best-effort worktree removal: the directory is deleted and the
    /// administrative entry pruned. Failures become warnings — a worktree
    /// that is already gone must not block the caller.
    pub fn remove_worktree(&self, path: &Path, force: bool) -> Vec<String> {
        let mut warnings = Vec::new();

        match fs::remove_dir_all(path) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => warnings.push(format!(
                "failed to remove worktree directory {}: {err}",
                path.display()
            )),
        }

        match self.repo.worktrees() {
            Ok(names) => {
                for name in names.iter().flatten() {
                    let Ok(worktree) = self.repo.find_worktree(name) else {
                        continue;
                    };
                    if worktree.path() != path {
                        continue;
                    }
                    let mut opts = git2::WorktreePruneOptions::new();
                    opts.valid(force).working_tree(true).locked(force);
                    if let Err(err) = worktree.prune(Some(&mut opts)) {
                        warnings.push(format!("failed to prune worktree {name}: {err}"));
                    }
                }
            }
            Err(err) => warnings.push(format!("failed to list worktrees: {err}")),
        }

        for warning in &warnings {
            warn!("{warning}");
        }
        warnings
    }

    pub fn list_worktrees(&self) -> Result<Vec<WorktreeInfo>> {
        let names = self.repo.worktrees().context("listing worktrees")?;
        let mut out = Vec::new();
        for name in names.iter().flatten() {
            let worktree = self
                .repo
                .find_worktree(name)
                .with_context(|| format!("finding worktree {name}"))?;
            let head = Repository::open_from_worktree(&worktree)
                .ok()
                .and_then(|repo| repo.head().ok().and_then(|h| h.target()))
                .map(|oid| oid.to_string());
            out.push(WorktreeInfo {
                name: name.to_string(),
                path: worktree.path().to_path_buf(),
                head,
            });
        }
        Ok(out)
    }

    /// Drop administrative entries for worktrees whose directories are gone.
    pub fn prune_worktrees(&self) -> Result<()> {
        let names = self.repo.worktrees().context("listing worktrees")?;
        for name in names.iter().flatten() {
            let Ok(worktree) = self.repo.find_worktree(name) else {
                continue;
            };
            if worktree.is_prunable(None).unwrap_or(false) {
                if let Err(err) = worktree.prune(None) {
                    warn!("failed to prune stale worktree {name}: {err}");
                }
            }
        }
        Ok(())
    }
}
