use anyhow::{Context, Result};
use git2::{IndexAddOption, Oid, Repository};
use std::path::Path;

/// Result of a snapshot attempt.
pub enum SaveOutcome {
    /// A new snapshot commit was written to the hidden ref.
    Created(Oid),
    /// The working tree already matches the last snapshot — an expected
    /// no-op, not an error.
    NoChanges,
}

/// Hidden ref namespace for work-in-progress snapshots of `branch`.
pub fn ref_name(branch: &str) -> String {
    format!("refs/wip/{branch}")
}

/// Capture the full working tree (tracked changes always; untracked,
/// non-ignored files when `include_untracked`) as a commit on
/// `refs/wip/<branch>`, without moving HEAD, the branch pointer, the
/// on-disk index, or the working tree.
///
/// The tree is built in an ephemeral in-memory index on a private
/// repository handle, so the caller's index binding is never disturbed.
/// Parents follow git-wip lineage: the previous snapshot tip (if any),
/// then the current HEAD commit when distinct.
pub fn save(
    repo: &Repository,
    branch: &str,
    message: &str,
    include_untracked: bool,
) -> Result<SaveOutcome> {
    let repo = Repository::open(repo.path()).context("reopening repository for snapshot")?;

    let head_commit = repo
        .head()
        .context("resolving HEAD")?
        .peel_to_commit()
        .context("peeling HEAD to commit")?;
    let head_tree = head_commit.tree().context("reading HEAD tree")?;

    let mut index = git2::Index::new().context("creating in-memory index")?;
    repo.set_index(&mut index)
        .context("attaching in-memory index")?;
    index
        .read_tree(&head_tree)
        .context("seeding index from HEAD tree")?;

    // Orchestra's own metadata lives under .claude/ and is never part of
    // a snapshot.
    let mut skip_metadata = |path: &Path, _matched: &[u8]| -> i32 {
        if path.starts_with(".claude") { 1 } else { 0 }
    };

    if include_untracked {
        index
            .add_all(
                ["*"].iter(),
                IndexAddOption::DEFAULT,
                Some(&mut skip_metadata),
            )
            .context("adding working tree files")?;
    }
    index
        .update_all(["*"].iter(), Some(&mut skip_metadata))
        .context("syncing tracked files")?;

    let tree_oid = index
        .write_tree_to(&repo)
        .context("writing snapshot tree")?;
    let tree = repo.find_tree(tree_oid).context("finding snapshot tree")?;

    let ref_name = ref_name(branch);
    let prior_tip = repo
        .find_reference(&ref_name)
        .ok()
        .and_then(|r| r.peel_to_commit().ok());

    if let Some(prior) = &prior_tip {
        if prior.tree_id() == tree_oid {
            return Ok(SaveOutcome::NoChanges);
        }
    }

    let sig = repo
        .signature()
        .context("reading git signature (user.name / user.email)")?;
    let mut parents: Vec<&git2::Commit> = Vec::new();
    if let Some(prior) = &prior_tip {
        parents.push(prior);
    }
    if prior_tip.as_ref().map(|p| p.id()) != Some(head_commit.id()) {
        parents.push(&head_commit);
    }

    let oid = repo
        .commit(None, &sig, &sig, message, &tree, &parents)
        .context("creating snapshot commit")?;
    repo.reference(&ref_name, oid, true, "wip snapshot")
        .with_context(|| format!("updating {ref_name}"))?;

    Ok(SaveOutcome::Created(oid))
}

#[cfg(test)]
mod tests;
