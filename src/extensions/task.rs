use anyhow::Result;
use chrono::{DateTime, Local};
use minijinja::{Environment, context};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::{ConfigStore, orchestra_dir};
use crate::extensions::Extension;
use crate::git::GitTaskManager;
use crate::invoker::ClaudeCli;
use crate::logging::truncate_value;
use crate::prefs::Preferences;
use crate::task::TaskState;
use crate::transcript;
use crate::types::{
    AdditionalContextOutput, HookInput, HookOutput, HookSpecificOutput, PostToolUseInput,
    PreToolUseInput, SessionStartInput, StopInput, SubagentStopInput, UserPromptSubmitInput,
};

/// Individual task requirement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Requirement {
    pub id: String,
    pub description: String,
    /// 1-5, where 1 is highest.
    pub priority: u8,
    #[serde(default)]
    pub completed: bool,
}

fn default_true() -> bool {
    true
}

fn default_max_deviations() -> u32 {
    3
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSettings {
    /// When set, a confidently incomplete task blocks the stop.
    #[serde(default = "default_true")]
    pub strict_mode: bool,
    #[serde(default = "default_max_deviations")]
    pub max_deviations: u32,
}

impl Default for TaskSettings {
    fn default() -> Self {
        Self {
            strict_mode: true,
            max_deviations: default_max_deviations(),
        }
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct TaskStats {
    #[serde(default)]
    pub deviations: u32,
    #[serde(default)]
    pub commands: u32,
}

/// Persisted monitor state: `.claude/orchestra/task.json`.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct TaskConfig {
    #[serde(default)]
    pub task: String,
    #[serde(default)]
    pub requirements: Vec<Requirement>,
    #[serde(default)]
    pub settings: TaskSettings,
    #[serde(default)]
    pub stats: TaskStats,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_task_state: Option<TaskState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<DateTime<Local>>,
}

const ANALYSIS_CONTEXT_TEMPLATE: &str = r#"Task: {{ task }}
{% if requirements %}Requirements:
{% for req in requirements %}- [{% if req.completed %}x{% else %} {% endif %}] (priority {{ req.priority }}) {{ req.description }}
{% endfor %}{% endif %}Files changed ({{ changed_files|length }}): {% if changed_files %}{{ changed_files|join(", ") }}{% else %}none{% endif %}

Diff of changes since the task snapshot:
```diff
{{ diff }}
```"#;

const COMPLETION_QUESTION: &str = "Have all of the task requirements been completed?";

/// Phrases in a subagent's closing message that indicate more work remains.
const CONTINUE_INDICATORS: &[&str] = &[
    "should continue",
    "keep working",
    "not complete",
    "incomplete",
    "more work needed",
    "requirements remaining",
    "next step",
    "focus on",
];

/// Phrases that indicate the subagent considers the task finished.
const STOP_INDICATORS: &[&str] = &[
    "can stop",
    "task complete",
    "all requirements met",
    "finished",
    "done",
    "no more work",
];

/// Keeps the assistant aligned with the tracked task: snapshots the working
/// tree when a prompt arrives, counts tool activity, and analyzes diffs at
/// stop time to decide whether the task is actually finished.
pub struct TaskMonitor {
    store: ConfigStore,
    config: TaskConfig,
    prefs: Preferences,
    claude: ClaudeCli,
    /// `None` outside a git repository — the monitor degrades to logging.
    git: Option<GitTaskManager>,
}

impl TaskMonitor {
    pub fn new(workdir: &Path) -> Result<Self> {
        let store = ConfigStore::for_extension(workdir, "task")?;
        let config = store.load()?;
        let prefs = Preferences::load(&orchestra_dir(workdir)?)?;
        let claude = ClaudeCli::new(
            Some(prefs.model.clone()),
            Duration::from_secs(prefs.claude_timeout_secs),
        );
        let git = GitTaskManager::open(workdir).ok();
        Ok(Self {
            store,
            config,
            prefs,
            claude,
            git,
        })
    }

    fn save(&mut self) -> Result<()> {
        self.config.updated = Some(Local::now());
        self.store.save(&self.config)
    }

    fn handle_session_start(&mut self, _input: &SessionStartInput) -> Result<Option<HookOutput>> {
        if self.config.task.is_empty() {
            return Ok(None);
        }
        let mut lines = vec![format!("Active Orchestra task: {}", self.config.task)];
        for req in &self.config.requirements {
            let mark = if req.completed { 'x' } else { ' ' };
            lines.push(format!("- [{mark}] {}", req.description));
        }
        Ok(Some(HookOutput {
            hook_specific_output: Some(HookSpecificOutput::SessionStart(
                AdditionalContextOutput {
                    additional_context: Some(lines.join("\n")),
                },
            )),
            ..Default::default()
        }))
    }

    fn handle_user_prompt_submit(
        &mut self,
        _input: &UserPromptSubmitInput,
    ) -> Result<Option<HookOutput>> {
        if self.config.task.is_empty() {
            return Ok(None);
        }
        if self.config.git_task_state.is_some() {
            // The existing snapshot keeps anchoring the task; re-inject the
            // task description so it stays in the assistant's context.
            return Ok(Some(HookOutput {
                hook_specific_output: Some(HookSpecificOutput::UserPromptSubmit(
                    AdditionalContextOutput {
                        additional_context: Some(format!(
                            "Active Orchestra task: {}",
                            self.config.task
                        )),
                    },
                )),
                ..Default::default()
            }));
        }
        let Some(git) = &self.git else {
            return Ok(None);
        };
        let state = git.create_snapshot(None, &self.config.task)?;
        info!(task_id = %state.task_id, branch = %state.branch_name, "task snapshot created");
        let hint = format!(
            "[orchestra] tracking task on branch {} (snapshot {})",
            state.branch_name,
            &state.base_sha[..8]
        );
        self.config.git_task_state = Some(state);
        self.save()?;
        Ok(Some(HookOutput::hint(hint)))
    }

    fn handle_pre_tool_use(&mut self, input: &PreToolUseInput) -> Result<Option<HookOutput>> {
        match input.tool_call() {
            Ok(call) => debug!(
                tool = %input.tool_name,
                input = %truncate_value(&format!("{call:?}"), self.prefs.log_truncate_chars),
                "tool starting"
            ),
            Err(err) => warn!(tool = %input.tool_name, %err, "unparseable tool input"),
        }
        if !self.config.task.is_empty() {
            self.config.stats.commands += 1;
            self.save()?;
        }
        Ok(None)
    }

    fn handle_post_tool_use(&mut self, input: &PostToolUseInput) -> Result<Option<HookOutput>> {
        debug!(
            tool = %input.tool_name,
            response = %truncate_value(&input.tool_response.to_string(), self.prefs.log_truncate_chars),
            "tool finished"
        );
        Ok(None)
    }

    fn handle_stop(&mut self, input: &StopInput) -> Result<Option<HookOutput>> {
        if self.config.task.is_empty() {
            return Ok(None);
        }
        if input.stop_hook_active {
            debug!("stop hook already active, skipping re-analysis");
            return Ok(None);
        }
        // An analysis failure must never hold the assistant hostage: log it
        // and allow the stop.
        match self.analyze_stop() {
            Ok(output) => Ok(output),
            Err(err) => {
                error!("stop analysis failed: {err:#}");
                Ok(None)
            }
        }
    }

    fn analyze_stop(&mut self) -> Result<Option<HookOutput>> {
        let (diff, changed_files) = self.gather_git_context()?;
        let context_block = self.render_analysis_context(&diff, &changed_files)?;
        let answer = self.claude.check_predicate(COMPLETION_QUESTION, Some(&context_block))?;
        info!(
            answer = ?answer.answer,
            confidence = answer.confidence,
            "completion predicate evaluated"
        );

        if self.config.settings.strict_mode
            && answer.is_confident_no(self.prefs.confidence_threshold)
        {
            self.config.stats.deviations += 1;
            self.save()?;
            let reason = if answer.reasoning.is_empty() {
                "Task requirements are not complete yet.".to_string()
            } else {
                answer.reasoning
            };
            return Ok(Some(HookOutput::block(format!(
                "Task \"{}\" is not complete: {reason}",
                self.config.task
            ))));
        }
        Ok(None)
    }

    /// Diff and changed files relative to the task snapshot; empty outside a
    /// repository or before a snapshot exists.
    fn gather_git_context(&mut self) -> Result<(String, Vec<String>)> {
        let Some(git) = &self.git else {
            return Ok((String::new(), Vec::new()));
        };
        let Some(state) = self.config.git_task_state.as_mut() else {
            return Ok((String::new(), Vec::new()));
        };
        git.update_task_state(state)?;
        let diff = git.get_task_diff(state, None)?;
        let files = git.get_changed_files(state, None)?;
        self.save()?;
        Ok((diff, files))
    }

    fn render_analysis_context(&self, diff: &str, changed_files: &[String]) -> Result<String> {
        let env = Environment::new();
        let tmpl = env.template_from_str(ANALYSIS_CONTEXT_TEMPLATE)?;
        Ok(tmpl.render(context! {
            task => self.config.task,
            requirements => self.config.requirements,
            changed_files,
            diff,
        })?)
    }

    fn handle_subagent_stop(&mut self, input: &SubagentStopInput) -> Result<Option<HookOutput>> {
        if input.stop_hook_active {
            return Ok(None);
        }
        let path = input
            .agent_transcript_path
            .as_deref()
            .unwrap_or(&input.common.transcript_path);
        let Some(text) = transcript::last_assistant_text(path)? else {
            return Ok(None);
        };

        let lower = text.to_lowercase();
        let should_continue = CONTINUE_INDICATORS.iter().any(|m| lower.contains(m));
        let should_stop = STOP_INDICATORS.iter().any(|m| lower.contains(m));
        debug!(should_continue, should_stop, "subagent verdict scan");

        if should_continue && !should_stop {
            let focus = text.lines().find(|line| {
                let line = line.to_lowercase();
                line.contains("focus on") || line.contains("next:")
            });
            let mut reason = "Task analysis indicates more work is needed".to_string();
            if let Some(focus) = focus {
                reason.push_str(". ");
                reason.push_str(focus.trim());
            }
            info!("blocking stop: {reason}");
            return Ok(Some(HookOutput::block(reason)));
        }
        Ok(None)
    }
}

impl Extension for TaskMonitor {
    fn name(&self) -> &'static str {
        "task"
    }

    fn handle(&mut self, input: &HookInput) -> Result<Option<HookOutput>> {
        match input {
            HookInput::SessionStart(e) => self.handle_session_start(e),
            HookInput::UserPromptSubmit(e) => self.handle_user_prompt_submit(e),
            HookInput::PreToolUse(e) => self.handle_pre_tool_use(e),
            HookInput::PostToolUse(e) => self.handle_post_tool_use(e),
            HookInput::Stop(e) => self.handle_stop(e),
            HookInput::SubagentStop(e) => self.handle_subagent_stop(e),
            _ => Ok(None),
        }
    }
}
