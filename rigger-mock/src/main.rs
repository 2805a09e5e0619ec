use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use rigger_core::audit::create_audit_logger;
use rigger_mock::{AppState, create_router};

#[derive(Parser)]
#[command(name = "rigger-mock")]
#[command(about = "Mock control plane for trying rigger against a local HTTP endpoint")]
struct Args {
    /// Listen address for the REST API
    #[arg(short, long, default_value = "127.0.0.1:8787")]
    listen: String,

    /// Require this bearer token on every request
    #[arg(long, env = "RIGGER_MOCK_TOKEN")]
    token: Option<String>,

    /// Preload resources from a rigger state file
    #[arg(long)]
    seed: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("rigger_mock=info".parse()?)
                .add_directive("audit=info".parse()?),
        )
        .init();

    let args = Args::parse();

    let state = Arc::new(AppState::new(args.token.clone(), create_audit_logger("mock")));
    if let Some(seed) = &args.seed {
        let count = state
            .seed_from(seed)
            .await
            .with_context(|| format!("failed to seed from {}", seed.display()))?;
        info!("Seeded {} resources from {}", count, seed.display());
    }

    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(&args.listen)
        .await
        .with_context(|| format!("failed to bind {}", args.listen))?;
    info!(
        "Mock control plane listening on http://{}/api/v1 (auth: {})",
        args.listen,
        if args.token.is_some() { "bearer token" } else { "none" }
    );

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            let ctrl_c = signal::ctrl_c();
            let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
                .expect("Failed to install SIGTERM handler");

            tokio::select! {
                _ = ctrl_c => info!("Received SIGINT"),
                _ = sigterm.recv() => info!("Received SIGTERM"),
            }
        })
        .await?;

    info!("Shutdown complete");
    Ok(())
}
