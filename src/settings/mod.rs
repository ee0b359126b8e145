use anyhow::{Context, Result};
use serde_json::{Value, json};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Where hook registrations live: the user's `~/.claude/settings.json` or
/// the project's `.claude/settings.json`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Global,
    Project,
}

pub fn settings_path(scope: Scope, workdir: &Path) -> Result<PathBuf> {
    match scope {
        Scope::Project => Ok(workdir.join(".claude").join("settings.json")),
        Scope::Global => {
            let home = dirs::home_dir().context("cannot determine home directory")?;
            Ok(home.join(".claude").join("settings.json"))
        }
    }
}

fn hook_command(extension: &str) -> String {
    format!("orchestra hook {extension}")
}

/// The settings file is shared with other tools — everything outside the
/// entries this module owns must round-trip untouched, so it is edited as a
/// raw JSON value rather than a typed struct.
fn read_settings(path: &Path) -> Result<Value> {
    match fs::read_to_string(path) {
        Ok(contents) => {
            serde_json::from_str(&contents).with_context(|| format!("parsing {}", path.display()))
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(json!({})),
        Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
    }
}

fn write_settings(path: &Path, value: &Value) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(value).context("serializing settings")?;
    fs::write(path, json).with_context(|| format!("writing {}", path.display()))
}

fn group_has_command(group: &Value, command: &str) -> bool {
    group["hooks"]
        .as_array()
        .is_some_and(|hooks| hooks.iter().any(|h| h["command"] == command))
}

/// Register `orchestra hook <extension>` for each of its events. Entries
/// belonging to other tools are preserved; re-enabling is a no-op.
pub fn enable(path: &Path, extension: &str, events: &[&str]) -> Result<()> {
    let mut root = read_settings(path)?;
    let obj = root
        .as_object_mut()
        .context("settings.json is not a JSON object")?;
    let hooks = obj
        .entry("hooks")
        .or_insert_with(|| json!({}))
        .as_object_mut()
        .context("settings.json `hooks` is not a JSON object")?;

    let command = hook_command(extension);
    for event in events {
        let entries = hooks
            .entry(*event)
            .or_insert_with(|| json!([]))
            .as_array_mut()
            .with_context(|| format!("settings.json hooks.{event} is not an array"))?;
        if entries.iter().any(|g| group_has_command(g, &command)) {
            continue;
        }
        entries.push(json!({
            "matcher": "",
            "hooks": [{"type": "command", "command": command}]
        }));
    }
    write_settings(path, &root)
}

/// Remove every registration of `orchestra hook <extension>`; event arrays
/// left empty are dropped.
pub fn disable(path: &Path, extension: &str) -> Result<()> {
    let mut root = read_settings(path)?;
    let command = hook_command(extension);
    if let Some(hooks) = root.get_mut("hooks").and_then(|h| h.as_object_mut()) {
        for entries in hooks.values_mut() {
            if let Some(groups) = entries.as_array_mut() {
                groups.retain(|g| !group_has_command(g, &command));
            }
        }
        hooks.retain(|_, entries| entries.as_array().map_or(true, |a| !a.is_empty()));
    }
    write_settings(path, &root)
}

/// Extensions with at least one registered hook command.
pub fn enabled_extensions(path: &Path) -> Result<Vec<String>> {
    let root = read_settings(path)?;
    let mut names: Vec<String> = Vec::new();
    if let Some(hooks) = root.get("hooks").and_then(|h| h.as_object()) {
        for entries in hooks.values() {
            for group in entries.as_array().into_iter().flatten() {
                for hook in group["hooks"].as_array().into_iter().flatten() {
                    let Some(cmd) = hook["command"].as_str() else {
                        continue;
                    };
                    if let Some(name) = cmd.strip_prefix("orchestra hook ") {
                        if !names.iter().any(|n| n == name) {
                            names.push(name.to_string());
                        }
                    }
                }
            }
        }
    }
    names.sort();
    Ok(names)
}

#[cfg(test)]
mod tests;
