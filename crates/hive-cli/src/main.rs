use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::{Map, Value, json};
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use hive_core::domain::{AgentId, BoardQueue, NewTask, TaskId, TaskPatch, TaskStatus};
use hive_core::{CoordinatorBuilder, HiveConfig, TaskBoard};

#[derive(Parser)]
#[command(name = "hive")]
#[command(about = "Inspect and drive a hive task board", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Directory holding the board's queue files
    #[arg(long, global = true, env = "HIVE_BOARD_DIR")]
    board_dir: Option<PathBuf>,

    /// JSON configuration file
    #[arg(long, global = true, env = "HIVE_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a task to the backlog
    Add(AddArgs),

    /// Move a task from backlog to ready
    Promote { task_id: String },

    /// Claim a ready task for an agent
    Claim {
        task_id: String,

        #[arg(long)]
        agent: String,

        /// Retry with backoff while the board is locked
        #[arg(long)]
        retry: bool,
    },

    /// Update a task in the working queue
    Update(UpdateArgs),

    /// Move a working task to completed
    Complete(CompleteArgs),

    /// Find a task in any queue
    Get { task_id: String },

    ListBacklog(ListArgs),
    ListReady(ListArgs),
    ListWorking(ListArgs),
    ListCompleted(ListArgs),

    /// Task counts per queue
    Stats,
}

#[derive(Args)]
struct AddArgs {
    action: String,

    /// Task id (generated when omitted)
    #[arg(long)]
    id: Option<String>,

    /// Lower is more urgent
    #[arg(long)]
    priority: Option<i64>,

    /// Parameters as a JSON object
    #[arg(long)]
    params: Option<String>,

    /// One parameter as key=value (value parsed as JSON when possible)
    #[arg(long = "param", value_name = "KEY=VALUE")]
    param: Vec<String>,

    #[arg(long = "depends-on", value_name = "TASK_ID")]
    depends_on: Vec<String>,

    /// Agent to send the task to, bypassing capability lookup
    #[arg(long)]
    target: Option<String>,
}

#[derive(Args)]
struct UpdateArgs {
    task_id: String,

    /// ASSIGNED, ACTIVE or DISPATCHED
    #[arg(long)]
    status: Option<TaskStatus>,

    #[arg(long)]
    agent: Option<String>,

    #[arg(long)]
    priority: Option<i64>,

    /// JSON object merged into the task's parameters
    #[arg(long)]
    params: Option<String>,

    #[arg(long)]
    result: Option<String>,

    #[arg(long)]
    error: Option<String>,
}

#[derive(Args)]
struct CompleteArgs {
    task_id: String,

    /// Terminal status (default COMPLETED)
    #[arg(long)]
    status: Option<TaskStatus>,

    #[arg(long)]
    result: Option<String>,

    #[arg(long)]
    error: Option<String>,
}

#[derive(Args)]
struct ListArgs {
    /// Only tasks with this status
    #[arg(long)]
    status: Option<TaskStatus>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    match run(cli).await {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<String> {
    let board = open_board(cli.board_dir, cli.config.as_deref())?;

    let value = match cli.command {
        Commands::Add(args) => {
            let task_id = board.add_to_backlog(new_task(args)?).await?;
            json!({ "task_id": task_id })
        }
        Commands::Promote { task_id } => to_json(&board.promote(&TaskId::new(task_id)).await?)?,
        Commands::Claim {
            task_id,
            agent,
            retry,
        } => {
            let task_id = TaskId::new(task_id);
            let agent = AgentId::new(agent);
            let task = if retry {
                board.claim_with_retry(&task_id, &agent).await?
            } else {
                board.claim(&task_id, &agent).await?
            };
            to_json(&task)?
        }
        Commands::Update(args) => {
            let task_id = TaskId::new(&args.task_id);
            let mut patch = TaskPatch {
                status: args.status,
                assigned_agent: args.agent.map(AgentId::new),
                priority: args.priority,
                result_summary: args.result,
                error_details: args.error,
                ..TaskPatch::default()
            };
            if let Some(raw) = args.params.as_deref() {
                patch.params = Some(parse_object(raw)?);
            }
            to_json(&board.update_working(&task_id, patch).await?)?
        }
        Commands::Complete(args) => {
            let patch = TaskPatch {
                status: args.status,
                result_summary: args.result,
                error_details: args.error,
                ..TaskPatch::default()
            };
            to_json(&board.complete(&TaskId::new(args.task_id), patch).await?)?
        }
        Commands::Get { task_id } => match board.get(&TaskId::new(&task_id)).await? {
            Some((queue, task)) => json!({ "queue": queue, "task": task }),
            None => bail!("task not found: {task_id}"),
        },
        Commands::ListBacklog(args) => list(&board, BoardQueue::Backlog, args).await?,
        Commands::ListReady(args) => list(&board, BoardQueue::Ready, args).await?,
        Commands::ListWorking(args) => list(&board, BoardQueue::Working, args).await?,
        Commands::ListCompleted(args) => list(&board, BoardQueue::Completed, args).await?,
        Commands::Stats => {
            let counts = board.counts().await?;
            json!({
                "backlog": counts.backlog,
                "ready": counts.ready,
                "working": counts.working,
                "completed": counts.completed,
                "total": counts.total(),
            })
        }
    };

    Ok(serde_json::to_string_pretty(&value)?)
}

fn open_board(
    board_dir: Option<PathBuf>,
    config_path: Option<&std::path::Path>,
) -> anyhow::Result<Arc<TaskBoard>> {
    let mut config = HiveConfig::load_or_default(config_path)?;
    if let Some(dir) = board_dir {
        config = config.with_board_dir(dir);
    }
    let coordinator = CoordinatorBuilder::new(config)
        .build()
        .context("use --board-dir or HIVE_BOARD_DIR to choose a board")?;
    debug!(board_dir = ?coordinator.config().board_dir, "board opened");
    Ok(coordinator.board().clone())
}

fn new_task(args: AddArgs) -> anyhow::Result<NewTask> {
    let mut draft = NewTask::new(args.action);
    if let Some(raw) = args.params.as_deref() {
        draft.params = parse_object(raw)?;
    }
    for pair in &args.param {
        let Some((key, raw)) = pair.split_once('=') else {
            bail!("--param expects KEY=VALUE, got {pair:?}");
        };
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        draft = draft.with_param(key, value);
    }
    if let Some(id) = args.id {
        draft = draft.with_id(id);
    }
    if let Some(priority) = args.priority {
        draft = draft.with_priority(priority);
    }
    for dep in args.depends_on {
        draft = draft.depends_on(dep);
    }
    if let Some(target) = args.target {
        draft = draft.targeting(target);
    }
    Ok(draft)
}

async fn list(board: &TaskBoard, queue: BoardQueue, args: ListArgs) -> anyhow::Result<Value> {
    let tasks = board.list(queue, args.status).await?;
    to_json(&tasks)
}

fn parse_object(raw: &str) -> anyhow::Result<Map<String, Value>> {
    match serde_json::from_str(raw).context("--params must be valid JSON")? {
        Value::Object(map) => Ok(map),
        _ => bail!("--params must be a JSON object"),
    }
}

fn to_json<T: Serialize>(value: &T) -> anyhow::Result<Value> {
    Ok(serde_json::to_value(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add_args(extra: &[&str]) -> AddArgs {
        let mut argv = vec!["hive", "add", "run_tests"];
        argv.extend_from_slice(extra);
        match Cli::try_parse_from(argv).unwrap().command {
            Commands::Add(args) => args,
            _ => unreachable!(),
        }
    }

    #[test]
    fn add_builds_task_from_flags() {
        let draft = new_task(add_args(&[
            "--id",
            "T1",
            "--priority",
            "2",
            "--param",
            "suite=\"unit\"",
            "--param",
            "shards=4",
            "--param",
            "name=plain",
            "--depends-on",
            "T0",
        ]))
        .unwrap();

        assert_eq!(draft.task_id, Some(TaskId::new("T1")));
        assert_eq!(draft.priority, Some(2));
        assert_eq!(draft.params["suite"], "unit");
        assert_eq!(draft.params["shards"], 4);
        assert_eq!(draft.params["name"], "plain");
        assert_eq!(draft.depends_on, vec![TaskId::new("T0")]);
    }

    #[test]
    fn params_must_be_an_object() {
        assert!(new_task(add_args(&["--params", "[1, 2]"])).is_err());
        assert!(new_task(add_args(&["--param", "missing-equals"])).is_err());
    }

    #[test]
    fn status_flag_parses_any_case() {
        let cli = Cli::try_parse_from(["hive", "list-working", "--status", "dispatched"]).unwrap();
        match cli.command {
            Commands::ListWorking(args) => assert_eq!(args.status, Some(TaskStatus::Dispatched)),
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn commands_drive_a_board_directory() {
        let dir = tempfile::tempdir().unwrap();
        let run_with = |argv: &[&str]| {
            let mut full = vec!["hive", "--board-dir", dir.path().to_str().unwrap()];
            full.extend_from_slice(argv);
            run(Cli::try_parse_from(full).unwrap())
        };

        run_with(&["add", "build", "--id", "T1"]).await.unwrap();
        run_with(&["promote", "T1"]).await.unwrap();
        run_with(&["claim", "T1", "--agent", "AgentA"]).await.unwrap();
        let second = run_with(&["claim", "T1", "--agent", "AgentB"]).await;
        assert!(second.unwrap_err().to_string().contains("already claimed"));

        let done = run_with(&["complete", "T1", "--result", "ok"]).await.unwrap();
        let done: Value = serde_json::from_str(&done).unwrap();
        assert_eq!(done["status"], "COMPLETED");

        let stats: Value = serde_json::from_str(&run_with(&["stats"]).await.unwrap()).unwrap();
        assert_eq!(stats["completed"], 1);
        assert_eq!(stats["total"], 1);

        assert!(run_with(&["get", "T9"]).await.is_err());
    }

    #[tokio::test]
    async fn update_merges_params() {
        let dir = tempfile::tempdir().unwrap();
        let run_with = |argv: &[&str]| {
            let mut full = vec!["hive", "--board-dir", dir.path().to_str().unwrap()];
            full.extend_from_slice(argv);
            run(Cli::try_parse_from(full).unwrap())
        };

        run_with(&["add", "test", "--id", "T1", "--params", r#"{"suite": "unit"}"#])
            .await
            .unwrap();
        run_with(&["promote", "T1"]).await.unwrap();
        run_with(&["claim", "T1", "--agent", "AgentA"]).await.unwrap();
        let updated = run_with(&["update", "T1", "--params", r#"{"shards": 4}"#])
            .await
            .unwrap();

        let updated: Value = serde_json::from_str(&updated).unwrap();
        assert_eq!(updated["params"], json!({"suite": "unit", "shards": 4}));
    }
}
