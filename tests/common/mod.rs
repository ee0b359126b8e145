use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Run the orchestra binary with the given args, stdin, working directory,
/// and extra environment. Returns (exit code, stdout, stderr).
pub fn run_cli(
    args: &[&str],
    stdin_json: &str,
    cwd: Option<&Path>,
    envs: &[(&str, &str)],
) -> (i32, String, String) {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_orchestra"));
    cmd.args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(cwd) = cwd {
        cmd.current_dir(cwd);
    }
    for (key, value) in envs {
        cmd.env(key, value);
    }
    let mut child = cmd.spawn().expect("failed to spawn binary");

    child
        .stdin
        .as_mut()
        .unwrap()
        .write_all(stdin_json.as_bytes())
        .unwrap();

    let output = child.wait_with_output().unwrap();
    (
        output.status.code().unwrap_or(-1),
        String::from_utf8_lossy(&output.stdout).to_string(),
        String::from_utf8_lossy(&output.stderr).to_string(),
    )
}

/// Create a temp dir containing a git repo with an initial commit holding
/// one tracked file. The `TempDir` must be kept alive for the test.
pub fn temp_git_repo() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let repo = git2::Repository::init(dir.path()).unwrap();

    let mut config = repo.config().unwrap();
    config.set_str("user.name", "Test").unwrap();
    config.set_str("user.email", "test@test.com").unwrap();

    std::fs::write(dir.path().join("README.md"), "# project\n").unwrap();
    let sig = repo.signature().unwrap();
    let mut index = repo.index().unwrap();
    index.add_path(Path::new("README.md")).unwrap();
    index.write().unwrap();
    let tree_oid = index.write_tree().unwrap();
    let tree = repo.find_tree(tree_oid).unwrap();
    repo.commit(Some("HEAD"), &sig, &sig, "initial", &tree, &[])
        .unwrap();

    dir
}

/// Stage everything except orchestra metadata and commit, simulating the
/// assistant committing its work.
pub fn commit_all(repo_path: &Path, message: &str) {
    let repo = git2::Repository::open(repo_path).unwrap();
    let mut index = repo.index().unwrap();
    index
        .add_all(
            ["*"].iter(),
            git2::IndexAddOption::DEFAULT,
            Some(&mut |path: &Path, _matched: &[u8]| {
                if path.starts_with(".claude") || path.to_string_lossy().contains("claude-") {
                    1 // skip
                } else {
                    0 // add
                }
            }),
        )
        .unwrap();
    index.write().unwrap();
    let tree_oid = index.write_tree().unwrap();
    let tree = repo.find_tree(tree_oid).unwrap();
    let sig = repo.signature().unwrap();
    let parent = repo.head().unwrap().peel_to_commit().unwrap();
    repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &[&parent])
        .unwrap();
}

pub fn head_sha(repo_path: &Path) -> String {
    let repo = git2::Repository::open(repo_path).unwrap();
    repo.head().unwrap().peel_to_commit().unwrap().id().to_string()
}

pub fn current_branch(repo_path: &Path) -> String {
    let repo = git2::Repository::open(repo_path).unwrap();
    repo.head().unwrap().shorthand().unwrap().to_string()
}

pub fn common(cwd: &str, transcript_path: &str) -> String {
    format!(
        r#"
    "session_id": "test-session",
    "transcript_path": "{transcript_path}",
    "cwd": "{cwd}"
"#
    )
}

/// Write a stub `claude` executable that prints a canned JSON envelope.
/// Inject it via ORCHESTRA_CLAUDE_BIN.
pub fn stub_claude(dir: &Path, response_text: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let envelope =
        serde_json::json!({"type": "result", "result": response_text, "model": "stub"});
    let path = dir.join("claude-stub.sh");
    let script = format!("#!/bin/sh\nprintf '%s\\n' '{envelope}'\n");
    std::fs::write(&path, script).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

/// Write a stub `claude` that exits nonzero.
pub fn failing_claude(dir: &Path) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("claude-fail.sh");
    std::fs::write(&path, "#!/bin/sh\necho 'boom' >&2\nexit 1\n").unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

/// Seed the task extension config with a tracked task description.
pub fn write_task_config(repo_path: &Path, task: &str) {
    let dir = repo_path.join(".claude").join("orchestra");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join("task.json"),
        serde_json::json!({"task": task}).to_string(),
    )
    .unwrap();
}

/// Read the task extension config back as raw JSON.
pub fn read_task_config(repo_path: &Path) -> serde_json::Value {
    let path = repo_path.join(".claude").join("orchestra").join("task.json");
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}
