//! `queuectl` - operator CLI for the local job queue.
//!
//! Everything lives under one home directory (`--home`, `$QUEUECTL_HOME`,
//! or `~/.queuectl`): `jobs.db`, `config.json` and `workers.pid`.

mod pidfile;
mod render;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use queuectl_core::config::{self, Config};
use queuectl_core::ports::submit;
use queuectl_core::{
    DefaultDecider, JobId, JobState, JobStore, NewJob, ShellExecutor, SqliteJobStore,
    SystemClock, WorkerDeps, WorkerOptions, WorkerPool, observability,
};

use crate::pidfile::PidFile;

/// In-flight jobs get this long to finish after a stop signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Background job queue.
#[derive(Parser, Debug)]
#[command(name = "queuectl", about = "Local persistent background job queue")]
struct Cli {
    /// Data directory (default: ~/.queuectl).
    #[arg(long, global = true, env = config::HOME_ENV)]
    home: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Enqueue a job from JSON, e.g. '{"id":"job1","command":"sleep 2"}'.
    Enqueue {
        /// Job JSON.
        json: String,
    },

    /// Enqueue a job without JSON quoting: `queuectl add job1 echo hello`.
    Add {
        /// Job id.
        id: String,
        /// Command words, joined with spaces.
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },

    /// Manage workers.
    Worker {
        #[command(subcommand)]
        action: WorkerAction,
    },

    /// Job counts per state and active workers.
    Status,

    /// List jobs, most recently updated first.
    List {
        /// Filter by state (pending, processing, completed, failed, dead).
        #[arg(long)]
        state: Option<JobState>,
        /// Maximum number of jobs to display.
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },

    /// Show one job as JSON.
    Show {
        /// Job id.
        id: String,
    },

    /// Dead letter queue.
    Dlq {
        #[command(subcommand)]
        action: DlqAction,
    },

    /// Read or change configuration.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Delete the home directory (database, config, PID file).
    Clear {
        /// Required; there is no undo.
        #[arg(long = "yes", short = 'y')]
        yes: bool,
    },
}

#[derive(Subcommand, Debug)]
enum WorkerAction {
    /// Run workers in the foreground until Ctrl-C or `worker stop`.
    Start {
        /// Number of concurrent workers.
        #[arg(long, default_value_t = 1)]
        count: usize,
        /// Exit once the queue is empty.
        #[arg(long)]
        drain: bool,
    },
    /// Signal every registered worker process to stop.
    Stop,
}

#[derive(Subcommand, Debug)]
enum DlqAction {
    /// List dead jobs.
    List {
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    /// Move a dead job back to pending with a fresh retry budget.
    Retry {
        /// Job id.
        id: String,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print one value, or all of them.
    Get { key: Option<String> },
    /// Set a value, e.g. `config set max-retries 5`.
    Set { key: String, value: String },
}

/// Paths under the home directory.
struct Home {
    root: PathBuf,
}

impl Home {
    fn new(root: Option<PathBuf>) -> Self {
        Self {
            root: root.unwrap_or_else(config::default_home),
        }
    }

    fn db_path(&self) -> PathBuf {
        self.root.join("jobs.db")
    }

    fn config_path(&self) -> PathBuf {
        self.root.join("config.json")
    }

    fn pid_file(&self) -> PidFile {
        PidFile::new(self.root.join("workers.pid"))
    }

    fn load_config(&self) -> anyhow::Result<Config> {
        let path = self.config_path();
        Config::load(&path).with_context(|| format!("failed to load {}", path.display()))
    }

    async fn open_store(&self) -> anyhow::Result<SqliteJobStore> {
        let path = self.db_path();
        SqliteJobStore::open(&path)
            .await
            .with_context(|| format!("failed to open {}", path.display()))
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if cli.log_json {
        observability::init_json();
    } else {
        observability::init();
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let home = Home::new(cli.home);

    match cli.command {
        Commands::Enqueue { json } => {
            let job: NewJob = serde_json::from_str(&json).context("invalid job JSON")?;
            enqueue(&home, job).await
        }
        Commands::Add { id, command } => enqueue(&home, NewJob::new(id, command.join(" "))).await,
        Commands::Worker { action } => match action {
            WorkerAction::Start { count, drain } => worker_start(&home, count, drain).await,
            WorkerAction::Stop => worker_stop(&home).await,
        },
        Commands::Status => status(&home).await,
        Commands::List { state, limit } => {
            let store = home.open_store().await?;
            let jobs = store.list(state, limit).await?;
            if jobs.is_empty() {
                match state {
                    Some(state) => println!("No jobs found with state '{state}'"),
                    None => println!("No jobs found"),
                }
            } else {
                print!("{}", render::job_table(&jobs));
            }
            Ok(())
        }
        Commands::Show { id } => {
            let store = home.open_store().await?;
            let id = JobId::new(id);
            let job = store
                .get(&id)
                .await?
                .with_context(|| format!("job '{id}' not found"))?;
            println!("{}", serde_json::to_string_pretty(&job)?);
            Ok(())
        }
        Commands::Dlq { action } => match action {
            DlqAction::List { limit } => {
                let store = home.open_store().await?;
                let jobs = store.list(Some(JobState::Dead), limit).await?;
                if jobs.is_empty() {
                    println!("DLQ is empty");
                } else {
                    print!("{}", render::dlq_table(&jobs));
                }
                Ok(())
            }
            DlqAction::Retry { id } => {
                let store = home.open_store().await?;
                let job = store.reset_from_dlq(&JobId::new(id)).await?;
                println!("[OK] Job '{}' moved back to queue for retry", job.id);
                Ok(())
            }
        },
        Commands::Config { action } => config_cmd(&home, action),
        Commands::Clear { yes } => clear(&home, yes),
    }
}

async fn enqueue(home: &Home, job: NewJob) -> anyhow::Result<()> {
    let config = home.load_config()?;
    let store = home.open_store().await?;
    let job = submit(&store, job, config.max_retries, Utc::now()).await?;
    println!("[OK] Job '{}' enqueued", job.id);
    Ok(())
}

async fn worker_start(home: &Home, count: usize, drain: bool) -> anyhow::Result<()> {
    if count == 0 {
        bail!("--count must be at least 1");
    }

    let config = home.load_config()?;
    let store = Arc::new(home.open_store().await?);

    let pid = std::process::id();
    let pids = home.pid_file();
    pids.register(pid)
        .with_context(|| format!("failed to write {}", pids.path().display()))?;

    let deps = WorkerDeps {
        store,
        executor: Arc::new(ShellExecutor::new(config.worker_timeout())),
        decider: Arc::new(DefaultDecider::new(config.retry_policy())),
        clock: Arc::new(SystemClock),
        options: WorkerOptions {
            drain,
            ..WorkerOptions::default()
        },
    };

    let mut pool = WorkerPool::spawn(count, deps);
    println!("[OK] Started {count} worker(s) (PID: {pid}). Press Ctrl+C to stop gracefully.");

    if drain {
        tokio::select! {
            _ = pool.stopped() => info!("queue drained"),
            _ = shutdown_signal() => info!("stop signal received"),
        }
    } else {
        shutdown_signal().await;
        info!("stop signal received");
    }

    let report = pool.shutdown(SHUTDOWN_GRACE).await;
    if let Err(e) = pids.unregister(pid) {
        warn!(error = %e, "failed to update PID file");
    }

    if report.aborted > 0 {
        println!(
            "[WARN] {} worker(s) stopped, {} aborted after {}s",
            report.stopped,
            report.aborted,
            SHUTDOWN_GRACE.as_secs()
        );
    } else {
        println!("[OK] All workers stopped");
    }
    Ok(())
}

async fn worker_stop(home: &Home) -> anyhow::Result<()> {
    let pids = home.pid_file();
    let registered = pids.read()?;
    if registered.is_empty() {
        println!("No workers running");
        return pids.remove().map_err(Into::into);
    }

    for pid in registered {
        if send_terminate(pid).await {
            println!("[OK] Sent stop signal to worker (PID: {pid})");
        } else {
            println!("[WARN] Worker (PID: {pid}) not found");
        }
    }
    pids.remove()?;
    Ok(())
}

async fn status(home: &Home) -> anyhow::Result<()> {
    let store = home.open_store().await?;
    let stats = store.stats().await?;
    let workers = home.pid_file().read()?;
    print!("{}", render::status(&stats, &workers));
    Ok(())
}

fn config_cmd(home: &Home, action: ConfigAction) -> anyhow::Result<()> {
    let path = home.config_path();
    let mut config = home.load_config()?;
    match action {
        ConfigAction::Get { key: Some(key) } => {
            let value = config
                .get(&key)
                .ok_or_else(|| config::ConfigError::UnknownKey(key.clone()))?;
            println!("{key}: {value}");
        }
        ConfigAction::Get { key: None } => {
            println!("Current configuration:");
            for (key, value) in config.entries() {
                println!("  {}: {value}", key.replace('_', "-"));
            }
        }
        ConfigAction::Set { key, value } => {
            config.set(&key, &value)?;
            config
                .save(&path)
                .with_context(|| format!("failed to save {}", path.display()))?;
            println!("[OK] Configuration updated: {key} = {value}");
        }
    }
    Ok(())
}

fn clear(home: &Home, yes: bool) -> anyhow::Result<()> {
    if !yes {
        bail!(
            "refusing to delete {} without --yes",
            home.root.display()
        );
    }
    if !home.root.exists() {
        println!("Nothing to clear at {}", home.root.display());
        return Ok(());
    }
    remove_home(&home.root)?;
    println!("[OK] Cleared {}", home.root.display());
    Ok(())
}

fn remove_home(root: &Path) -> anyhow::Result<()> {
    std::fs::remove_dir_all(root).with_context(|| format!("failed to remove {}", root.display()))
}

/// Ctrl-C, or SIGTERM from `queuectl worker stop`.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Ask `pid` to terminate. Returns `false` if no such process.
async fn send_terminate(pid: u32) -> bool {
    #[cfg(unix)]
    let mut cmd = {
        let mut cmd = tokio::process::Command::new("kill");
        cmd.arg("-TERM").arg(pid.to_string());
        cmd
    };
    #[cfg(windows)]
    let mut cmd = {
        let mut cmd = tokio::process::Command::new("taskkill");
        cmd.arg("/PID").arg(pid.to_string());
        cmd
    };

    cmd.stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null());
    match cmd.status().await {
        Ok(status) => status.success(),
        Err(e) => {
            warn!(pid, error = %e, "failed to send stop signal");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn add_joins_command_words() {
        let cli = Cli::try_parse_from(["queuectl", "add", "job1", "echo", "-n", "hello"]).unwrap();
        let Commands::Add { id, command } = cli.command else {
            panic!("expected add");
        };
        assert_eq!(id, "job1");
        assert_eq!(command.join(" "), "echo -n hello");
    }

    #[test]
    fn list_parses_state_filter() {
        let cli = Cli::try_parse_from(["queuectl", "list", "--state", "dead", "--limit", "5"])
            .unwrap();
        let Commands::List { state, limit } = cli.command else {
            panic!("expected list");
        };
        assert_eq!(state, Some(JobState::Dead));
        assert_eq!(limit, 5);
    }

    #[test]
    fn clear_requires_confirmation() {
        let dir = tempfile::tempdir().unwrap();
        let home = Home::new(Some(dir.path().join("home")));
        std::fs::create_dir_all(&home.root).unwrap();

        assert!(clear(&home, false).is_err());
        assert!(home.root.exists());

        clear(&home, true).unwrap();
        assert!(!home.root.exists());
    }

    #[test]
    fn config_set_persists() {
        let dir = tempfile::tempdir().unwrap();
        let home = Home::new(Some(dir.path().to_path_buf()));

        config_cmd(
            &home,
            ConfigAction::Set {
                key: "max-retries".to_string(),
                value: "5".to_string(),
            },
        )
        .unwrap();
        assert_eq!(home.load_config().unwrap().max_retries, 5);

        let err = config_cmd(
            &home,
            ConfigAction::Set {
                key: "backoff-base".to_string(),
                value: "0".to_string(),
            },
        )
        .unwrap_err();
        assert!(err.to_string().contains("backoff_base"), "{err}");
    }

    #[tokio::test]
    async fn enqueue_rejects_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let home = Home::new(Some(dir.path().to_path_buf()));

        enqueue(&home, NewJob::new("a", "true")).await.unwrap();
        let err = enqueue(&home, NewJob::new("a", "false")).await.unwrap_err();
        assert!(err.to_string().contains("already exists"), "{err}");

        let store = home.open_store().await.unwrap();
        let job = store.get(&JobId::new("a")).await.unwrap().unwrap();
        assert_eq!(job.command, "true");
        assert_eq!(job.max_retries, 3);
    }
}
