use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::signal;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use rigger_core::{
    ControlPlane, EXIT_INVALID_PLAN, ExecutorOptions, FileControlPlane, HttpControlPlane, Plan,
    PlanExecutor, PlanFile, RetryPolicy, create_audit_logger,
};

mod init;
mod output;

use output::OutputFormat;

#[derive(Parser)]
#[command(name = "rigger")]
#[command(about = "Bring declared infrastructure into existence, safely re-runnable")]
#[command(long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create every declared resource that does not exist yet
    Reconcile {
        #[command(flatten)]
        run: RunArgs,
    },

    /// Show what reconcile would do without creating anything
    Plan {
        #[command(flatten)]
        run: RunArgs,
    },

    /// Check a plan file and print its execution order
    Validate {
        /// Plan file (YAML, or JSON with a .json extension)
        #[arg(short, long, default_value = "rigger.yaml")]
        plan: PathBuf,
    },

    /// Write a starter plan
    Init {
        /// Where to write the plan
        #[arg(short, long, default_value = "rigger.yaml")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

impl Commands {
    /// Exit code when the command fails before producing a report.
    fn failure_code(&self) -> u8 {
        match self {
            Commands::Init { .. } => 1,
            _ => EXIT_INVALID_PLAN as u8,
        }
    }
}

#[derive(Args)]
struct RunArgs {
    /// Plan file (YAML, or JSON with a .json extension)
    #[arg(short, long, default_value = "rigger.yaml")]
    plan: PathBuf,

    /// Report format
    #[arg(short, long, value_enum, default_value = "table")]
    output: OutputFormat,

    #[command(flatten)]
    backend: BackendArgs,
}

#[derive(Args)]
struct BackendArgs {
    /// Use a local state file as the control plane
    #[arg(long, env = "RIGGER_STATE_FILE", conflicts_with = "endpoint")]
    state_file: Option<PathBuf>,

    /// Control plane endpoint
    #[arg(long, env = "RIGGER_ENDPOINT", default_value = "http://127.0.0.1:8787")]
    endpoint: String,

    /// Bearer token for the control plane
    #[arg(long, env = "RIGGER_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Per-request timeout in seconds
    #[arg(long, default_value = "30")]
    timeout_secs: u64,

    /// Describe attempts per resource, including the first
    #[arg(long, default_value = "3")]
    retry_attempts: u32,

    /// Delay after the first transient failure; doubled after each further one
    #[arg(long, default_value = "500")]
    retry_base_ms: u64,
}

impl BackendArgs {
    fn control_plane(&self) -> Result<Arc<dyn ControlPlane>> {
        match &self.state_file {
            Some(path) => {
                info!("Using state file {}", path.display());
                Ok(Arc::new(FileControlPlane::new(path)))
            }
            None => {
                info!("Using control plane at {}", self.endpoint);
                let client = HttpControlPlane::new(
                    &self.endpoint,
                    self.token.clone(),
                    Duration::from_secs(self.timeout_secs),
                )?;
                Ok(Arc::new(client))
            }
        }
    }

    fn retry(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry_attempts, Duration::from_millis(self.retry_base_ms))
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(e) = init_tracing() {
        eprintln!("Error: {}", e);
    }

    let cli = Cli::parse();
    let failure_code = cli.command.failure_code();
    match run(cli.command).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(failure_code)
        }
    }
}

fn init_tracing() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("rigger=warn".parse()?)
                .add_directive("audit=info".parse()?),
        )
        .init();
    Ok(())
}

async fn run(command: Commands) -> Result<u8> {
    match command {
        Commands::Reconcile { run } => execute(run, false).await,
        Commands::Plan { run } => execute(run, true).await,
        Commands::Validate { plan } => validate(&plan).await,
        Commands::Init { output, force } => {
            init::run(&output, force).await?;
            Ok(0)
        }
    }
}

async fn validate(path: &Path) -> Result<u8> {
    let file = PlanFile::load(path).await?;
    let plan = Plan::build(&file.resources)?;

    println!("{} is valid ({} resources)", path.display(), plan.len());
    for (position, resource) in plan.resources().iter().enumerate() {
        if resource.dependencies.is_empty() {
            println!("{:>3}. {}", position + 1, resource.id);
        } else {
            let deps: Vec<String> = resource.dependencies.iter().map(ToString::to_string).collect();
            println!("{:>3}. {} (after {})", position + 1, resource.id, deps.join(", "));
        }
    }
    Ok(0)
}

async fn execute(args: RunArgs, dry_run: bool) -> Result<u8> {
    let file = PlanFile::load(&args.plan).await?;
    debug!("Loaded {} declarations from {}", file.resources.len(), args.plan.display());

    let client = args
        .backend
        .control_plane()
        .context("Failed to set up control plane client")?;
    let executor = PlanExecutor::with_audit(
        client,
        ExecutorOptions {
            retry: args.backend.retry(),
            dry_run,
        },
        create_audit_logger("rigger"),
    );

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_shutdown().await;
        warn!("Stopping after the current resource");
        let _ = cancel_tx.send(true);
    });

    let report = executor.run_with_cancel(&file.resources, cancel_rx).await;
    println!("{}", output::render(&report, args.output)?);

    Ok(u8::try_from(report.exit_code()).unwrap_or(EXIT_INVALID_PLAN as u8))
}

async fn wait_for_shutdown() {
    let ctrl_c = signal::ctrl_c();
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
        .expect("Failed to install SIGTERM handler");

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = sigterm.recv() => info!("Received SIGTERM"),
    }
}
