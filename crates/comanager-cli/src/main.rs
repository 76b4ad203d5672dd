use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, anyhow};
use clap::{Parser, Subcommand};
use tokio::time::{Duration, sleep};
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

use comanager_core::domain::{Alert, ManagerError, Task, TaskId, TaskStatus};
use comanager_core::impls::JsonFileStore;
use comanager_core::ports::Stores;
use comanager_core::{App, AppBuilder, Config};

const DEFAULT_DATA_DIR: &str = ".comanager";
const POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Parser)]
#[command(name = "comanager")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "IT co-manager: plan, run, heal and report on operational tasks", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Data directory for tasks, reports and logs (overrides the config file)
    #[arg(short, long)]
    data_dir: Option<PathBuf>,

    /// Print JSON instead of text
    #[arg(long)]
    json: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Plan a goal and run it to completion
    Run {
        /// Goal, e.g. "Patch all production servers"
        #[arg(required = true, num_args = 1..)]
        goal: Vec<String>,
    },

    /// Turn a monitoring alert into a task and run it
    Alert {
        #[arg(long)]
        title: String,

        #[arg(long, default_value = "")]
        description: String,
    },

    /// Replace a failed task with a self-healing retry
    Retry { task_id: TaskId },

    /// Generate (or fetch) the root cause analysis report of a task
    Report { task_id: TaskId },

    /// Show one task
    Show { task_id: TaskId },

    /// List tasks, oldest first
    List {
        /// Only tasks with this status (pending, in-progress, completed, failed, superseded)
        #[arg(long)]
        status: Option<TaskStatus>,
    },

    /// Count tasks per status
    Stats,

    /// Simulate a shell command
    Console {
        #[arg(required = true, num_args = 1..)]
        command: Vec<String>,
    },

    /// Start a pending task (when engine.auto_start = false)
    Start { task_id: TaskId },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if cli.verbose {
            "info,comanager_core=debug"
        } else {
            "warn"
        })
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => Config::default(),
    };
    let data_dir = cli
        .data_dir
        .clone()
        .or_else(|| config.store.data_dir.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));
    debug!(data_dir = %data_dir.display(), "opening store");

    let store = JsonFileStore::open(&data_dir)
        .await
        .with_context(|| format!("opening data directory {}", data_dir.display()))?;
    let app = AppBuilder::new()
        .stores(Stores::from_backend(Arc::new(store)))
        .with_template_services()
        .config(config)
        .build()?;

    run(&app, cli.command, cli.json).await
}

async fn run(app: &App, command: Commands, json: bool) -> anyhow::Result<()> {
    match command {
        Commands::Run { goal } => {
            let task = app.create_task(&goal.join(" ")).await.map_err(fail)?;
            finish(app, task, json).await
        }
        Commands::Alert { title, description } => {
            let task = app
                .resolve_alert(&Alert::new(title, description))
                .await
                .map_err(fail)?;
            finish(app, task, json).await
        }
        Commands::Retry { task_id } => {
            let outcome = app.retry_task(task_id).await.map_err(fail)?;
            if !json {
                println!(
                    "{} superseded by {}",
                    outcome.original.id, outcome.replacement.id
                );
            }
            finish(app, outcome.replacement, json).await
        }
        Commands::Start { task_id } => {
            let task = app.start_task(task_id).await.map_err(fail)?;
            finish(app, task, json).await
        }
        Commands::Report { task_id } => {
            let report = app.generate_report(task_id).await.map_err(fail)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", report.report);
            }
            Ok(())
        }
        Commands::Show { task_id } => {
            let task = app
                .task(task_id)
                .await
                .map_err(fail)?
                .ok_or_else(|| fail(ManagerError::TaskNotFound(task_id)))?;
            print_task(&task, json)
        }
        Commands::List { status } => {
            let tasks = match status {
                Some(status) => app.tasks_by_status(status).await,
                None => app.tasks().await,
            }
            .map_err(fail)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&tasks)?);
            } else {
                for task in &tasks {
                    println!("{}  {:<11} {:>3}%  {}", task.id, task.status, task.progress, task.goal);
                }
            }
            Ok(())
        }
        Commands::Stats => {
            let counts = app.status_counts().await.map_err(fail)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&counts)?);
            } else {
                for status in TaskStatus::ALL {
                    println!("{:<11} {}", status, counts.get(status));
                }
                println!("{:<11} {}", "total", counts.total());
            }
            Ok(())
        }
        Commands::Console { command } => {
            let output = app
                .simulate_command(&command.join(" "))
                .await
                .map_err(fail)?;
            println!("{output}");
            Ok(())
        }
    }
}

/// Log the detail, surface only the generic message.
fn fail(err: ManagerError) -> anyhow::Error {
    error!(kind = ?err.kind(), error = %err, "request failed");
    anyhow!(err.user_message())
}

/// Wait until `task` reaches a terminal status, reporting progress on stderr.
///
/// Execution runs inside this process, so returning early would abandon it.
async fn finish(app: &App, task: Task, json: bool) -> anyhow::Result<()> {
    if !json {
        eprintln!("{} created with {} steps: {}", task.id, task.steps.len(), task.goal);
    }

    let mut last = task;
    while !last.status.is_terminal() && last.status != TaskStatus::Pending {
        sleep(POLL_INTERVAL).await;
        let Some(current) = app.task(last.id).await.map_err(fail)? else {
            return Err(fail(ManagerError::TaskNotFound(last.id)));
        };
        if !json && current.version != last.version {
            for (i, step) in current.steps.iter().enumerate() {
                let before = last.steps.get(i).map(|s| s.status);
                if before != Some(step.status) && step.status.is_terminal() {
                    eprintln!(
                        "  [{:>3}%] step {}/{} {}: {}",
                        current.progress,
                        i + 1,
                        current.steps.len(),
                        step.status,
                        step.log.as_deref().unwrap_or_default()
                    );
                }
            }
        }
        last = current;
    }

    print_task(&last, json)
}

fn print_task(task: &Task, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(task)?);
        return Ok(());
    }

    println!("{}  [{}] {}%", task.id, task.status, task.progress);
    println!("goal: {}", task.goal);
    if let Some(replacement) = task.superseded_by {
        println!("superseded by: {replacement}");
    }
    for (i, step) in task.steps.iter().enumerate() {
        println!("  {}. [{}] {}", i + 1, step.status, step.description);
        if let Some(log) = &step.log {
            println!("     {log}");
        }
    }
    Ok(())
}
