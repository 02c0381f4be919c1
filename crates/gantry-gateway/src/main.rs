//! # gantry-gateway
//!
//! Gateway binary — wires together the store, workflow engine, process
//! supervisor, and action dispatcher, then serves newline-delimited JSON
//! envelopes over stdio.

#![deny(unsafe_code)]

mod logging;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};

use gantry_rpc::{register_all, ActionContext, ActionRegistry, ActionRequest, ActionResponse};
use gantry_runner::{RunnerConfig, Supervisor};
use gantry_store::{new_file, run_migrations, ConnectionConfig};
use gantry_workflow::{SystemGit, WorkflowService};

/// Gantry gateway server.
#[derive(Parser, Debug)]
#[command(name = "gantry-gateway", about = "Project/task workflow gateway")]
struct Cli {
    /// Path to the `SQLite` database.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Base directory for the process supervisor (state file, logs, pids).
    #[arg(long)]
    runner_dir: Option<PathBuf>,

    /// Directory prefix supervised tasks may use as cwd (repeatable).
    #[arg(long = "allowed-cwd")]
    allowed_cwds: Vec<PathBuf>,

    /// Minimum log level when RUST_LOG is unset.
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn home_dir() -> PathBuf {
    PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string()))
}

impl Cli {
    fn db_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| home_dir().join(".gantry").join("gantry.db"))
    }

    fn runner_config(&self) -> RunnerConfig {
        let mut config = RunnerConfig::default();
        if let Some(dir) = &self.runner_dir {
            config.base_dir = dir.clone();
        }
        if !self.allowed_cwds.is_empty() {
            config.allowed_cwds = self.allowed_cwds.clone();
        }
        config
    }
}

fn ensure_parent_dir(path: &std::path::Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(&cli.log_level);

    let db_path = cli.db_path();
    ensure_parent_dir(&db_path)?;
    let pool = new_file(
        db_path.to_string_lossy().as_ref(),
        &ConnectionConfig::default(),
    )
    .context("Failed to open database")?;
    {
        let conn = pool.get().context("Failed to acquire connection")?;
        run_migrations(&conn).context("Failed to run migrations")?;
    }
    info!(db = %db_path.display(), "database ready");

    let supervisor = Arc::new(Supervisor::new(cli.runner_config()));
    supervisor
        .init()
        .await
        .context("Failed to recover supervisor state")?;
    info!("process supervisor recovered");

    let workflow = Arc::new(WorkflowService::new(pool, Arc::new(SystemGit)));
    let ctx = ActionContext {
        workflow,
        runner: Some(supervisor),
    };
    let mut registry = ActionRegistry::new();
    register_all(&mut registry);

    serve_stdio(&registry, &ctx).await
}

/// One JSON envelope per line on stdin; one response per line on stdout.
async fn serve_stdio(registry: &ActionRegistry, ctx: &ActionContext) -> Result<()> {
    let stdin = BufReader::new(tokio::io::stdin());
    let mut stdout = tokio::io::stdout();
    let mut lines = stdin.lines();

    info!("serving on stdio");
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<ActionRequest>(line) {
            Ok(request) => registry.dispatch(request, ctx).await,
            Err(e) => {
                warn!(error = %e, "unparseable envelope");
                ActionResponse::error(None, "INVALID_PARAMS", format!("invalid envelope: {e}"))
            }
        };
        let mut out = serde_json::to_string(&response)
            .unwrap_or_else(|_| r#"{"success":false,"error":{"code":"INTERNAL_ERROR","message":"serialization failed"}}"#.to_string());
        out.push('\n');
        stdout.write_all(out.as_bytes()).await?;
        stdout.flush().await?;
    }
    info!("stdin closed, shutting down");
    Ok(())
}
