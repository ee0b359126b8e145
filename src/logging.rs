use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Initialize file logging for a hook invocation. Log lines land in
/// `.claude/logs/<extension>.log`; the filter is overridable via
/// `ORCHESTRA_LOG`. The returned guard must stay alive until the process
/// exits or buffered lines are lost.
pub fn init(workdir: &Path, extension: &str) -> Result<WorkerGuard> {
    let log_dir = workdir.join(".claude").join("logs");
    fs::create_dir_all(&log_dir).with_context(|| format!("creating {}", log_dir.display()))?;

    let appender = tracing_appender::rolling::never(&log_dir, format!("{extension}.log"));
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let filter =
        EnvFilter::try_from_env("ORCHESTRA_LOG").unwrap_or_else(|_| EnvFilter::new("orchestra=debug"));
    // A second init in the same process is a no-op.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .with_target(false)
        .try_init();

    Ok(guard)
}

/// Truncate a value for logging. Hook payloads routinely carry whole file
/// contents; log lines keep the head plus the original size.
pub fn truncate_value(value: &str, max_chars: usize) -> String {
    if value.len() <= max_chars {
        return value.to_string();
    }
    // Find the last char boundary at or before the limit.
    let mut end = max_chars;
    while end > 0 && !value.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... [{} chars total]", &value[..end], value.len())
}
