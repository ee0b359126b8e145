mod config;
mod extensions;
mod git;
mod invoker;
mod logging;
mod prefs;
mod settings;
mod task;
mod transcript;
mod types;
mod wip;

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use std::io::{self, Read};
use std::path::PathBuf;
use std::process;

use config::ConfigStore;
use extensions::task::{TaskConfig, TaskStats};
use git::GitTaskManager;
use settings::Scope;
use types::HookInput;

#[derive(Parser)]
#[command(name = "orchestra", version, about = "Hook-driven extensions for Claude Code")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Handle a hook event: reads the event JSON on stdin, writes the
    /// decision to stdout.
    Hook { extension: String },
    /// Register an extension's hooks in settings.json.
    Enable {
        extension: String,
        /// Write to the project's .claude/settings.json instead of ~/.claude.
        #[arg(long)]
        project: bool,
    },
    /// Remove an extension's hooks from settings.json.
    Disable {
        extension: String,
        #[arg(long)]
        project: bool,
    },
    /// Show enabled extensions, repository state, and the tracked task.
    Status,
    /// Manage the tracked task.
    Task {
        #[command(subcommand)]
        command: TaskCommand,
    },
    /// Manage analysis worktrees.
    Worktree {
        #[command(subcommand)]
        command: WorktreeCommand,
    },
}

#[derive(Subcommand)]
enum TaskCommand {
    /// Start tracking a task and snapshot the working tree.
    Start { description: String },
    /// Stop tracking the current task and clear its state.
    Complete,
    /// Show the tracked task.
    Show,
}

#[derive(Subcommand)]
enum WorktreeCommand {
    /// Create a worktree at the given path.
    Add {
        path: PathBuf,
        /// Branch to check out in the worktree (created if missing).
        #[arg(long)]
        branch: Option<String>,
        /// Ref the branch is created from (defaults to HEAD).
        #[arg(long)]
        base: Option<String>,
    },
    /// List worktrees.
    List,
    /// Remove a worktree; failures are reported but not fatal.
    Remove {
        path: PathBuf,
        #[arg(long)]
        force: bool,
    },
    /// Drop administrative entries for worktrees whose directories are gone.
    Prune,
}

fn main() {
    let cli = Cli::parse();
    let result = match cli.command {
        Command::Hook { extension } => {
            run_hook(&extension);
            return;
        }
        Command::Enable { extension, project } => cmd_enable(&extension, project),
        Command::Disable { extension, project } => cmd_disable(&extension, project),
        Command::Status => cmd_status(),
        Command::Task { command } => cmd_task(command),
        Command::Worktree { command } => cmd_worktree(command),
    };
    if let Err(err) = result {
        eprintln!("orchestra: {err:#}");
        process::exit(2);
    }
}

/// Hook entry point. A fault inside Orchestra must never block the
/// assistant: every failure is logged and the process exits 0 with no
/// blocking output.
fn run_hook(extension: &str) {
    if let Err(err) = try_run_hook(extension) {
        tracing::error!("hook failed: {err:#}");
        eprintln!("orchestra: {err:#}");
    }
}

fn try_run_hook(extension: &str) -> Result<()> {
    let mut input = String::new();
    io::stdin()
        .read_to_string(&mut input)
        .context("reading stdin")?;
    let hook_input: HookInput = serde_json::from_str(&input).context("parsing hook input")?;

    let workdir = PathBuf::from(&hook_input.common().cwd);
    let _guard = logging::init(&workdir, extension)?;

    let mut extension = extensions::create(extension, &workdir)?;
    tracing::debug!(extension = extension.name(), "dispatching hook event");
    if let Some(output) = extension.handle(&hook_input)? {
        println!(
            "{}",
            serde_json::to_string(&output).context("serializing hook output")?
        );
    }
    Ok(())
}

fn workdir() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

fn scope_of(project: bool) -> Scope {
    if project { Scope::Project } else { Scope::Global }
}

fn cmd_enable(extension: &str, project: bool) -> Result<()> {
    let events = extensions::events_for(extension)
        .with_context(|| format!("unknown extension: {extension}"))?;
    let path = settings::settings_path(scope_of(project), &workdir())?;
    settings::enable(&path, extension, events)?;
    println!("Enabled {extension} in {}", path.display());
    Ok(())
}

fn cmd_disable(extension: &str, project: bool) -> Result<()> {
    let path = settings::settings_path(scope_of(project), &workdir())?;
    settings::disable(&path, extension)?;
    println!("Disabled {extension} in {}", path.display());
    Ok(())
}

fn cmd_status() -> Result<()> {
    let dir = workdir();

    for (scope, label) in [(Scope::Global, "global"), (Scope::Project, "project")] {
        let path = settings::settings_path(scope, &dir)?;
        let enabled = settings::enabled_extensions(&path)?;
        if enabled.is_empty() {
            println!("{label}: no extensions enabled");
        } else {
            println!("{label}: {}", enabled.join(", "));
        }
    }

    match GitTaskManager::open(&dir) {
        Ok(manager) => {
            let status = manager.status()?;
            println!(
                "On branch {} at {}{}",
                status.branch,
                &status.sha[..8],
                if status.is_clean { "" } else { " (dirty)" }
            );
        }
        Err(_) => println!("Not in a git repository"),
    }

    let store = ConfigStore::for_extension(&dir, "task")?;
    let config: TaskConfig = store.load()?;
    if config.task.is_empty() {
        println!("No task configured");
    } else {
        println!("Task: {}", config.task);
        if let Some(state) = &config.git_task_state {
            println!(
                "  snapshot {} on {} ({} commands, {} deviations)",
                &state.base_sha[..8],
                state.branch_name,
                config.stats.commands,
                config.stats.deviations
            );
        }
    }
    Ok(())
}

fn cmd_task(command: TaskCommand) -> Result<()> {
    let dir = workdir();
    let store = ConfigStore::for_extension(&dir, "task")?;
    let mut config: TaskConfig = store.load()?;

    match command {
        TaskCommand::Start { description } => {
            config.task = description;
            config.stats = TaskStats::default();
            config.git_task_state = match GitTaskManager::open(&dir) {
                Ok(manager) => Some(manager.create_snapshot(None, &config.task)?),
                // Outside a repository the monitor still tracks the task text.
                Err(_) => None,
            };
            config.updated = Some(Local::now());
            store.save(&config)?;
            println!("Tracking task: {}", config.task);
            if let Some(state) = &config.git_task_state {
                println!(
                    "  snapshot on {} at {}",
                    state.branch_name,
                    &state.base_sha[..8]
                );
            }
        }
        TaskCommand::Complete => {
            if config.task.is_empty() {
                println!("No task configured");
                return Ok(());
            }
            println!("Completed task: {}", config.task);
            config.task.clear();
            config.requirements.clear();
            config.stats = TaskStats::default();
            config.git_task_state = None;
            config.updated = Some(Local::now());
            store.save(&config)?;
        }
        TaskCommand::Show => {
            if config.task.is_empty() {
                println!("No task configured");
            } else {
                println!("Task: {}", config.task);
                for req in &config.requirements {
                    let mark = if req.completed { 'x' } else { ' ' };
                    println!("  [{mark}] {}", req.description);
                }
            }
        }
    }
    Ok(())
}

fn cmd_worktree(command: WorktreeCommand) -> Result<()> {
    let manager = GitTaskManager::open(&workdir())?;
    match command {
        WorktreeCommand::Add { path, branch, base } => {
            let created = manager.create_worktree(&path, branch.as_deref(), base.as_deref())?;
            println!("Created worktree at {}", created.display());
        }
        WorktreeCommand::List => {
            let worktrees = manager.list_worktrees()?;
            if worktrees.is_empty() {
                println!("No worktrees");
            }
            for wt in worktrees {
                let head = wt.head.as_deref().unwrap_or("?");
                println!("{}  {}  {}", wt.name, &head[..head.len().min(8)], wt.path.display());
            }
        }
        WorktreeCommand::Remove { path, force } => {
            for warning in manager.remove_worktree(&path, force) {
                eprintln!("orchestra: warning: {warning}");
            }
            println!("Removed worktree {}", path.display());
        }
        WorktreeCommand::Prune => {
            manager.prune_worktrees()?;
            println!("Pruned stale worktrees");
        }
    }
    Ok(())
}
