use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::io;
use tracing::debug;

/// One JSONL transcript entry. Only the fields needed to recover assistant
/// text are modeled; everything else is ignored.
#[derive(Debug, Deserialize)]
struct Entry {
    #[serde(rename = "type")]
    entry_type: String,
    #[serde(default)]
    message: Option<Message>,
}

#[derive(Debug, Deserialize)]
struct Message {
    #[serde(default)]
    content: serde_json::Value,
}

/// Read a JSONL transcript and return the text of the last assistant
/// message. A missing file reads as `None` — the agent may not have written
/// anything yet. Unparseable lines are skipped, not fatal.
pub fn last_assistant_text(path: &str) -> Result<Option<String>> {
    let contents = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).with_context(|| format!("reading transcript {path}")),
    };

    let mut last = None;
    for (idx, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let entry: Entry = match serde_json::from_str(line) {
            Ok(entry) => entry,
            Err(err) => {
                debug!(line = idx + 1, %err, "skipping unparseable transcript line");
                continue;
            }
        };
        if entry.entry_type != "assistant" {
            continue;
        }
        if let Some(message) = entry.message {
            let text = collect_text(&message.content);
            if !text.is_empty() {
                last = Some(text);
            }
        }
    }
    Ok(last)
}

/// Assistant content is either a plain string or an array of typed blocks;
/// only `text` blocks contribute.
fn collect_text(content: &serde_json::Value) -> String {
    match content {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Array(parts) => parts
            .iter()
            .filter(|p| p.get("type").and_then(|t| t.as_str()) == Some("text"))
            .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests;
