use anyhow::{Context, Result, anyhow, bail};
use minijinja::{Environment, context};
use std::io::Read;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;

/// Model aliases for different use cases. Anything not listed is passed to
/// the CLI unchanged; "default" omits the flag entirely.
const MODEL_ALIASES: &[(&str, &str)] = &[
    ("fast", "haiku"),
    ("small", "haiku"),
    ("balanced", "sonnet"),
    ("powerful", "opus"),
];

fn resolve_model(name: &str) -> Option<&str> {
    if name == "default" {
        return None;
    }
    Some(
        MODEL_ALIASES
            .iter()
            .find(|(alias, _)| *alias == name)
            .map(|(_, model)| *model)
            .unwrap_or(name),
    )
}

/// A single request to the Claude CLI.
pub struct InvokeRequest<'a> {
    pub prompt: &'a str,
    /// Model alias or full name; falls back to the wrapper's default.
    pub model: Option<&'a str>,
    pub system_prompt: Option<&'a str>,
}

/// Parsed response envelope from `--output-format json`.
#[derive(Debug)]
pub struct ClaudeResponse {
    pub content: String,
    pub model: Option<String>,
    pub duration: Duration,
}

/// Parsed yes/no predicate result.
#[derive(Debug)]
pub struct PredicateAnswer {
    /// `None` when no answer could be extracted at all.
    pub answer: Option<bool>,
    pub confidence: f64,
    pub reasoning: String,
}

impl PredicateAnswer {
    /// True when the answer is a "no" confident enough to act on.
    pub fn is_confident_no(&self, threshold: f64) -> bool {
        self.answer == Some(false) && self.confidence >= threshold
    }

    /// True when the answer is a "yes" confident enough to act on.
    pub fn is_confident_yes(&self, threshold: f64) -> bool {
        self.answer == Some(true) && self.confidence >= threshold
    }
}

const PREDICATE_TEMPLATE: &str = "\
Answer the following yes/no question based on the provided context.

Question: {{ question }}

{% if context %}Context:
{{ context }}

{% endif %}Instructions:
1. Answer with YES or NO
2. Provide a confidence level (0.0 to 1.0)
3. Give brief reasoning (1-2 sentences)

Response format:
ANSWER: [YES/NO]
CONFIDENCE: [0.0-1.0]
REASONING: [Brief explanation]";

const PREDICATE_SYSTEM_PROMPT: &str = "You are a precise evaluation assistant. \
You answer yes/no questions based on provided context. Be decisive but accurate.";

/// Blocking wrapper around the external `claude` CLI.
///
/// Constructed explicitly by each caller and passed down — there is no
/// shared global instance. `ORCHESTRA_CLAUDE_BIN` overrides the binary path.
pub struct ClaudeCli {
    program: String,
    default_model: Option<String>,
    timeout: Duration,
}

impl ClaudeCli {
    pub fn new(default_model: Option<String>, timeout: Duration) -> Self {
        let program =
            std::env::var("ORCHESTRA_CLAUDE_BIN").unwrap_or_else(|_| "claude".to_string());
        Self {
            program,
            default_model,
            timeout,
        }
    }

    fn build_command(&self, req: &InvokeRequest) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("--print");
        cmd.args(["--output-format", "json"]);
        let model = req
            .model
            .or(self.default_model.as_deref())
            .and_then(resolve_model);
        if let Some(model) = model {
            cmd.args(["--model", model]);
        }
        if let Some(system_prompt) = req.system_prompt {
            cmd.args(["--append-system-prompt", system_prompt]);
        }
        cmd.args(["-p", req.prompt]);
        cmd
    }

    /// Run the CLI to completion, with a hard kill at the timeout.
    pub fn invoke(&self, req: &InvokeRequest) -> Result<ClaudeResponse> {
        let started = Instant::now();
        debug!(prompt_len = req.prompt.len(), model = ?req.model, "invoking claude");

        let mut cmd = self.build_command(req);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        let mut child = cmd.spawn().with_context(|| {
            format!("spawning {} (is it installed and on PATH?)", self.program)
        })?;

        // Drain pipes on reader threads so a chatty child can't deadlock
        // against the try_wait poll below.
        let mut stdout_pipe = child.stdout.take().context("capturing stdout")?;
        let mut stderr_pipe = child.stderr.take().context("capturing stderr")?;
        let stdout_reader = thread::spawn(move || {
            let mut buf = String::new();
            stdout_pipe.read_to_string(&mut buf).map(|_| buf)
        });
        let stderr_reader = thread::spawn(move || {
            let mut buf = String::new();
            stderr_pipe.read_to_string(&mut buf).map(|_| buf)
        });

        let status = loop {
            if let Some(status) = child.try_wait().context("waiting for claude")? {
                break status;
            }
            if started.elapsed() >= self.timeout {
                let _ = child.kill();
                let _ = child.wait();
                bail!("claude timed out after {}s", self.timeout.as_secs());
            }
            thread::sleep(Duration::from_millis(50));
        };

        let stdout = stdout_reader
            .join()
            .map_err(|_| anyhow!("stdout reader panicked"))?
            .context("reading claude stdout")?;
        let stderr = stderr_reader
            .join()
            .map_err(|_| anyhow!("stderr reader panicked"))?
            .context("reading claude stderr")?;

        if !status.success() {
            bail!("claude exited with {status}: {}", stderr.trim());
        }

        let (content, model) = parse_envelope(&stdout).context("parsing claude output")?;
        let duration = started.elapsed();
        debug!(content_len = content.len(), ?duration, "claude completed");
        Ok(ClaudeResponse {
            content,
            model,
            duration,
        })
    }

    /// Ask a yes/no question on the fast model and parse the structured
    /// answer.
    pub fn check_predicate(
        &self,
        question: &str,
        context_block: Option<&str>,
    ) -> Result<PredicateAnswer> {
        let env = Environment::new();
        let tmpl = env
            .template_from_str(PREDICATE_TEMPLATE)
            .context("parsing predicate template")?;
        let prompt = tmpl
            .render(context! { question, context => context_block })
            .context("rendering predicate prompt")?;

        let response = self.invoke(&InvokeRequest {
            prompt: &prompt,
            model: Some("fast"),
            system_prompt: Some(PREDICATE_SYSTEM_PROMPT),
        })?;
        debug!(model = ?response.model, duration = ?response.duration, "predicate answered");
        Ok(parse_predicate_response(&response.content))
    }
}

/// The `--output-format json` envelope carries the text under `result`
/// (current CLI) or `content` (older builds).
fn parse_envelope(output: &str) -> Result<(String, Option<String>)> {
    let value: serde_json::Value =
        serde_json::from_str(output.trim()).context("claude output is not valid JSON")?;
    let content = value
        .get("result")
        .or_else(|| value.get("content"))
        .and_then(|v| v.as_str())
        .context("no result/content field in claude output")?
        .to_string();
    let model = value
        .get("model")
        .and_then(|v| v.as_str())
        .map(String::from);
    Ok((content, model))
}

/// Parse ANSWER/CONFIDENCE/REASONING lines. When the structured lines are
/// missing, fall back to a whole-word YES/NO scan at reduced confidence.
fn parse_predicate_response(response: &str) -> PredicateAnswer {
    let mut answer = None;
    let mut confidence = 0.0;
    let mut reasoning = String::new();

    for line in response.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("ANSWER:") {
            answer = Some(rest.trim().eq_ignore_ascii_case("yes"));
        } else if let Some(rest) = line.strip_prefix("CONFIDENCE:") {
            if let Ok(value) = rest.trim().parse() {
                confidence = value;
            }
        } else if let Some(rest) = line.strip_prefix("REASONING:") {
            reasoning = rest.trim().to_string();
        }
    }

    if answer.is_none() {
        let yes = count_word(response, "YES");
        let no = count_word(response, "NO");
        (answer, confidence) = match (yes, no) {
            (y, 0) if y > 0 => (Some(true), 0.5),
            (0, n) if n > 0 => (Some(false), 0.5),
            (y, n) if y > n => (Some(true), 0.3),
            (y, n) if n > y => (Some(false), 0.3),
            _ => (None, 0.0),
        };
    }

    PredicateAnswer {
        answer,
        confidence,
        reasoning,
    }
}

fn count_word(text: &str, word: &str) -> usize {
    text.to_uppercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| *w == word)
        .count()
}
