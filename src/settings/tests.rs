use super::*;

fn temp_settings() -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.json");
    (dir, path)
}

#[test]
fn enable_registers_each_event_once() {
    let (_dir, path) = temp_settings();
    enable(&path, "task", &["Stop", "UserPromptSubmit"]).unwrap();
    enable(&path, "task", &["Stop", "UserPromptSubmit"]).unwrap();

    let root: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    let stop_entries = root["hooks"]["Stop"].as_array().unwrap();
    assert_eq!(stop_entries.len(), 1);
    assert_eq!(
        stop_entries[0]["hooks"][0]["command"],
        "orchestra hook task"
    );
    assert_eq!(root["hooks"]["UserPromptSubmit"].as_array().unwrap().len(), 1);
}

#[test]
fn disable_removes_only_our_entries() {
    let (_dir, path) = temp_settings();
    fs::write(
        &path,
        serde_json::to_string_pretty(&json!({
            "model": "sonnet",
            "hooks": {
                "Stop": [
                    {"matcher": "", "hooks": [{"type": "command", "command": "other-tool --check"}]}
                ]
            }
        }))
        .unwrap(),
    )
    .unwrap();

    enable(&path, "task", &["Stop"]).unwrap();
    disable(&path, "task").unwrap();

    let root: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    // Unrelated settings and hook entries survive.
    assert_eq!(root["model"], "sonnet");
    let stop_entries = root["hooks"]["Stop"].as_array().unwrap();
    assert_eq!(stop_entries.len(), 1);
    assert_eq!(
        stop_entries[0]["hooks"][0]["command"],
        "other-tool --check"
    );
}

#[test]
fn disable_drops_emptied_event_arrays() {
    let (_dir, path) = temp_settings();
    enable(&path, "tester", &["Stop"]).unwrap();
    disable(&path, "tester").unwrap();

    let root: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert!(root["hooks"].get("Stop").is_none());
}

#[test]
fn enabled_extensions_lists_registered_names() {
    let (_dir, path) = temp_settings();
    assert!(enabled_extensions(&path).unwrap().is_empty());

    enable(&path, "task", &["Stop", "UserPromptSubmit"]).unwrap();
    enable(&path, "tester", &["Stop"]).unwrap();
    assert_eq!(
        enabled_extensions(&path).unwrap(),
        vec!["task".to_string(), "tester".to_string()]
    );
}
