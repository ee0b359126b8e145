pub mod task;
pub mod tester;

pub use task::TaskMonitor;
pub use tester::TesterMonitor;

use anyhow::{Result, bail};
use std::path::Path;

use crate::types::{HookInput, HookOutput};

/// A hook-driven extension. One instance handles one hook invocation — the
/// process is stateless between invocations, so all durable state lives in
/// the extension's config file.
pub trait Extension {
    fn name(&self) -> &'static str;
    fn handle(&mut self, input: &HookInput) -> Result<Option<HookOutput>>;
}

/// Known extensions and the hook events they subscribe to.
pub const REGISTRY: &[(&str, &[&str])] = &[
    (
        "task",
        &[
            "SessionStart",
            "UserPromptSubmit",
            "PreToolUse",
            "PostToolUse",
            "Stop",
            "SubagentStop",
        ],
    ),
    ("tester", &["UserPromptSubmit", "Stop"]),
];

pub fn events_for(extension: &str) -> Option<&'static [&'static str]> {
    REGISTRY
        .iter()
        .find(|(name, _)| *name == extension)
        .map(|(_, events)| *events)
}

pub fn create(extension: &str, workdir: &Path) -> Result<Box<dyn Extension>> {
    match extension {
        "task" => Ok(Box::new(TaskMonitor::new(workdir)?)),
        "tester" => Ok(Box::new(TesterMonitor::new(workdir)?)),
        other => bail!("unknown extension: {other}"),
    }
}
