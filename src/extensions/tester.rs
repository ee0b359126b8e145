use anyhow::Result;
use chrono::{DateTime, Local};
use minijinja::{Environment, context};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::config::{ConfigStore, orchestra_dir};
use crate::extensions::Extension;
use crate::git::GitTaskManager;
use crate::invoker::ClaudeCli;
use crate::prefs::Preferences;
use crate::task::TaskState;
use crate::types::{HookInput, HookOutput, StopInput, UserPromptSubmitInput};

fn default_true() -> bool {
    true
}

fn default_test_markers() -> Vec<String> {
    vec!["test".into(), "spec".into()]
}

/// Persisted tester state: `.claude/orchestra/tester.json`.
#[derive(Debug, Serialize, Deserialize)]
pub struct TesterConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Path substrings marking a file as test code.
    #[serde(default = "default_test_markers")]
    pub test_markers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_task_state: Option<TaskState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<DateTime<Local>>,
}

impl Default for TesterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            test_markers: default_test_markers(),
            git_task_state: None,
            updated: None,
        }
    }
}

const TESTS_QUESTION: &str =
    "Do these code changes need new or updated tests before the work can be considered done?";

const TESTER_CONTEXT_TEMPLATE: &str = r#"Source files changed without accompanying test changes:
{% for file in source_files %}- {{ file }}
{% endfor %}
Diff of the changes:
```diff
{{ diff }}
```"#;

/// Watches each turn's diff for source changes that arrive without test
/// changes, and asks whether tests are owed before the turn ends.
pub struct TesterMonitor {
    store: ConfigStore,
    config: TesterConfig,
    prefs: Preferences,
    claude: ClaudeCli,
    git: Option<GitTaskManager>,
}

impl TesterMonitor {
    pub fn new(workdir: &Path) -> Result<Self> {
        let store = ConfigStore::for_extension(workdir, "tester")?;
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

    fn is_test_path(&self, path: &str) -> bool {
        let path = path.to_lowercase();
        self.config.test_markers.iter().any(|m| path.contains(m))
    }

    /// Each prompt starts a new turn: re-snapshot so the stop-time diff
    /// covers exactly this turn's work.
    fn handle_user_prompt_submit(
        &mut self,
        _input: &UserPromptSubmitInput,
    ) -> Result<Option<HookOutput>> {
        if !self.config.enabled {
            return Ok(None);
        }
        let Some(git) = &self.git else {
            return Ok(None);
        };
        let state = git.create_snapshot(None, "tester baseline")?;
        debug!(branch = %state.branch_name, "turn baseline captured");
        self.config.git_task_state = Some(state);
        self.save()?;
        Ok(None)
    }

    fn handle_stop(&mut self, input: &StopInput) -> Result<Option<HookOutput>> {
        if !self.config.enabled || input.stop_hook_active {
            return Ok(None);
        }
        match self.analyze_stop() {
            Ok(output) => Ok(output),
            Err(err) => {
                error!("tester analysis failed: {err:#}");
                Ok(None)
            }
        }
    }

    fn analyze_stop(&mut self) -> Result<Option<HookOutput>> {
        let Some(git) = &self.git else {
            return Ok(None);
        };
        let Some(state) = &self.config.git_task_state else {
            return Ok(None);
        };
        let files = git.get_changed_files(state, None)?;
        if files.is_empty() {
            return Ok(None);
        }

        let (test_files, source_files): (Vec<&String>, Vec<&String>) =
            files.iter().partition(|f| self.is_test_path(f));
        if source_files.is_empty() || !test_files.is_empty() {
            // Nothing to test, or tests came along with the changes.
            return Ok(None);
        }

        let diff = git.get_task_diff(state, None)?;
        let env = Environment::new();
        let tmpl = env.template_from_str(TESTER_CONTEXT_TEMPLATE)?;
        let context_block = tmpl.render(context! { source_files, diff })?;

        let answer = self.claude.check_predicate(TESTS_QUESTION, Some(&context_block))?;
        info!(
            answer = ?answer.answer,
            confidence = answer.confidence,
            "test-coverage predicate evaluated"
        );

        let file_list = source_files
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        if answer.is_confident_yes(self.prefs.confidence_threshold) {
            return Ok(Some(HookOutput::block(format!(
                "Changed source files have no accompanying tests: {file_list}. \
                 Add or update tests before finishing."
            ))));
        }
        if answer.answer == Some(true) {
            return Ok(Some(HookOutput::hint(format!(
                "[orchestra] consider adding tests for: {file_list}"
            ))));
        }
        Ok(None)
    }
}

impl Extension for TesterMonitor {
    fn name(&self) -> &'static str {
        "tester"
    }

    fn handle(&mut self, input: &HookInput) -> Result<Option<HookOutput>> {
        match input {
            HookInput::UserPromptSubmit(e) => self.handle_user_prompt_submit(e),
            HookInput::Stop(e) => self.handle_stop(e),
            _ => Ok(None),
        }
    }
}
