use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use divecloud_runner::config::{AppConfig, Overrides};
use divecloud_runner::run::RunOrchestrator;
use divecloud_runner::shutdown::cancel_on_shutdown;

#[derive(Parser)]
#[command(name = "divecloud-runner", about = "Run a DiveCloud test plan and wait for its result")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// DiveCloud plan to run
    #[arg(long)]
    plan_id: Option<String>,

    /// URL DiveCloud should POST the result to; omit to poll instead
    #[arg(long)]
    callback_url: Option<String>,

    /// Seconds between status polls
    #[arg(long)]
    poll_interval: Option<u64>,

    /// Minutes to wait for the callback
    #[arg(long)]
    listen_timeout: Option<u64>,

    /// Directory the results file is written to
    #[arg(long)]
    workspace: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(cli.json_logs.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!cli.json_logs).then(|| tracing_subscriber::fmt::layer()))
        .init();

    let overrides = Overrides {
        config_path: cli.config,
        plan_id: cli.plan_id,
        callback_url: cli.callback_url,
        poll_interval_secs: cli.poll_interval,
        listen_timeout_mins: cli.listen_timeout,
        workspace_dir: cli.workspace,
    };

    let config = match AppConfig::load(&overrides) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Invalid configuration");
            return Ok(ExitCode::from(2));
        }
    };

    tracing::info!(
        plan_id = %config.run.plan_id,
        base_url = %config.api.base_url,
        "Starting DiveCloud run"
    );

    let orchestrator = RunOrchestrator::from_config(&config)?;

    let cancel = CancellationToken::new();
    cancel_on_shutdown(cancel.clone());

    let report = orchestrator.run(&cancel).await;

    tracing::info!(
        outcome = %report.outcome,
        test_id = ?report.test_id,
        artifact = ?report.artifact,
        elapsed_secs = (report.finished_at - report.started_at).num_seconds(),
        "Run finished"
    );

    Ok(if report.passed() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
