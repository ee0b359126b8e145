use super::*;
use std::fs;

/// Init a repo with one commit containing `tracked.txt`.
fn repo_with_commit() -> (tempfile::TempDir, Repository) {
    let dir = tempfile::tempdir().unwrap();
    let repo = Repository::init(dir.path()).unwrap();
    let mut config = repo.config().unwrap();
    config.set_str("user.name", "Test").unwrap();
    config.set_str("user.email", "test@test.com").unwrap();

    fs::write(dir.path().join("tracked.txt"), "v1\n").unwrap();
    let sig = repo.signature().unwrap();
    let mut index = repo.index().unwrap();
    index.add_path(std::path::Path::new("tracked.txt")).unwrap();
    index.write().unwrap();
    let tree_oid = index.write_tree().unwrap();
    let tree = repo.find_tree(tree_oid).unwrap();
    repo.commit(Some("HEAD"), &sig, &sig, "initial", &tree, &[])
        .unwrap();
    drop(tree);
    (dir, repo)
}

fn head_branch(repo: &Repository) -> String {
    repo.head().unwrap().shorthand().unwrap().to_string()
}

fn wip_tree_paths(repo: &Repository, branch: &str) -> Vec<String> {
    let commit = repo
        .find_reference(&ref_name(branch))
        .unwrap()
        .peel_to_commit()
        .unwrap();
    let tree = commit.tree().unwrap();
    let mut paths = Vec::new();
    tree.walk(git2::TreeWalkMode::PreOrder, |prefix, entry| {
        if entry.kind() == Some(git2::ObjectType::Blob) {
            paths.push(format!("{prefix}{}", entry.name().unwrap()));
        }
        git2::TreeWalkResult::Ok
    })
    .unwrap();
    paths
}

#[test]
fn save_captures_modified_and_untracked_files() {
    let (dir, repo) = repo_with_commit();
    let head_before = repo.head().unwrap().peel_to_commit().unwrap().id();

    fs::write(dir.path().join("tracked.txt"), "v2\n").unwrap();
    fs::write(dir.path().join("new.txt"), "hello\n").unwrap();

    let outcome = save(&repo, &head_branch(&repo), "Task: t1", true).unwrap();
    assert!(matches!(outcome, SaveOutcome::Created(_)));

    let paths = wip_tree_paths(&repo, &head_branch(&repo));
    assert!(paths.contains(&"tracked.txt".to_string()));
    assert!(paths.contains(&"new.txt".to_string()));

    // Non-destructive: HEAD unmoved, working tree still dirty.
    assert_eq!(
        repo.head().unwrap().peel_to_commit().unwrap().id(),
        head_before
    );
    let statuses = repo.statuses(None).unwrap();
    assert!(!statuses.is_empty(), "working tree should still be dirty");
}

#[test]
fn save_without_untracked_excludes_new_files() {
    let (dir, repo) = repo_with_commit();
    fs::write(dir.path().join("tracked.txt"), "v2\n").unwrap();
    fs::write(dir.path().join("new.txt"), "hello\n").unwrap();

    let outcome = save(&repo, &head_branch(&repo), "Task: t1", false).unwrap();
    assert!(matches!(outcome, SaveOutcome::Created(_)));

    let paths = wip_tree_paths(&repo, &head_branch(&repo));
    assert!(paths.contains(&"tracked.txt".to_string()));
    assert!(!paths.contains(&"new.txt".to_string()));
}

#[test]
fn second_save_with_no_changes_is_a_no_op() {
    let (_dir, repo) = repo_with_commit();

    let first = save(&repo, &head_branch(&repo), "Task: t1", true).unwrap();
    assert!(matches!(first, SaveOutcome::Created(_)));
    let tip_after_first = repo
        .find_reference(&ref_name(&head_branch(&repo)))
        .unwrap()
        .target()
        .unwrap();

    let second = save(&repo, &head_branch(&repo), "Task: t1", true).unwrap();
    assert!(matches!(second, SaveOutcome::NoChanges));
    assert_eq!(
        repo.find_reference(&ref_name(&head_branch(&repo)))
            .unwrap()
            .target()
            .unwrap(),
        tip_after_first,
        "no new snapshot commit expected"
    );
}

#[test]
fn ignored_files_stay_out_of_the_snapshot() {
    let (dir, repo) = repo_with_commit();
    fs::write(dir.path().join(".gitignore"), "*.log\n").unwrap();
    fs::write(dir.path().join("debug.log"), "noise\n").unwrap();

    save(&repo, &head_branch(&repo), "Task: t1", true).unwrap();

    let paths = wip_tree_paths(&repo, &head_branch(&repo));
    assert!(!paths.contains(&"debug.log".to_string()));
    assert!(paths.contains(&".gitignore".to_string()));
}

#[test]
fn metadata_dir_stays_out_of_the_snapshot() {
    let (dir, repo) = repo_with_commit();
    fs::create_dir_all(dir.path().join(".claude/orchestra")).unwrap();
    fs::write(dir.path().join(".claude/orchestra/task.json"), "{}\n").unwrap();
    fs::write(dir.path().join("new.txt"), "hello\n").unwrap();

    save(&repo, &head_branch(&repo), "Task: t1", true).unwrap();

    let paths = wip_tree_paths(&repo, &head_branch(&repo));
    assert!(paths.contains(&"new.txt".to_string()));
    assert!(!paths.iter().any(|p| p.starts_with(".claude")));
}

#[test]
fn snapshot_commit_is_parented_on_prior_tip_and_head() {
    let (dir, repo) = repo_with_commit();
    fs::write(dir.path().join("new.txt"), "one\n").unwrap();
    save(&repo, &head_branch(&repo), "Task: t1", true).unwrap();

    fs::write(dir.path().join("new.txt"), "two\n").unwrap();
    let outcome = save(&repo, &head_branch(&repo), "Task: t1", true).unwrap();
    let SaveOutcome::Created(oid) = outcome else {
        panic!("expected a new snapshot commit");
    };

    let commit = repo.find_commit(oid).unwrap();
    let head = repo.head().unwrap().peel_to_commit().unwrap().id();
    let parents: Vec<_> = commit.parent_ids().collect();
    assert_eq!(parents.len(), 2);
    assert!(parents.contains(&head));
}
