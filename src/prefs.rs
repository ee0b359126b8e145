use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;

const FILENAME: &str = "orchestra.toml";

fn default_model() -> String {
    "fast".into()
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_truncate_chars() -> usize {
    200
}

fn default_confidence_threshold() -> f64 {
    0.8
}

/// Global preferences stored in `.claude/orchestra/orchestra.toml`.
#[derive(Debug, Serialize, Deserialize)]
pub struct Preferences {
    /// Model used for analysis calls: an alias ("fast", "balanced",
    /// "powerful") or a full model name.
    #[serde(default = "default_model")]
    pub model: String,

    /// Hard timeout for a single Claude CLI invocation.
    #[serde(default = "default_timeout_secs")]
    pub claude_timeout_secs: u64,

    /// Maximum length of a logged value before truncation.
    #[serde(default = "default_truncate_chars")]
    pub log_truncate_chars: usize,

    /// Minimum predicate confidence required before a monitor blocks.
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            model: default_model(),
            claude_timeout_secs: default_timeout_secs(),
            log_truncate_chars: default_truncate_chars(),
            confidence_threshold: default_confidence_threshold(),
        }
    }
}

impl Preferences {
    /// Load preferences from `.claude/orchestra/orchestra.toml`.
    ///
    /// If the file doesn't exist it is created with defaults. Missing keys
    /// in an existing file are filled in with defaults via serde.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(FILENAME);
        match fs::read_to_string(&path) {
            Ok(contents) => {
                let prefs: Preferences = toml::from_str(&contents)
                    .with_context(|| format!("parsing {}", path.display()))?;
                Ok(prefs)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                let prefs = Preferences::default();
                let toml_str =
                    toml::to_string_pretty(&prefs).context("serializing default preferences")?;
                fs::write(&path, &toml_str)
                    .with_context(|| format!("writing default {}", path.display()))?;
                Ok(prefs)
            }
            Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
        }
    }
}
