mod bootstrap;
mod dispatch;
mod health;
mod scheduler;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use scrumbot_core::config::{AppConfig, LoadOptions};
use tracing_subscriber::EnvFilter;

use crate::dispatch::VERSION;

#[derive(Debug, Parser)]
#[command(
    name = "scrumbot-server",
    about = "Slack bot that runs Scrum ceremonies and board hygiene on Trello",
    disable_version_flag = true
)]
struct Args {
    /// Start without loading cron jobs
    #[arg(long)]
    nocron: bool,
    /// Print the version and exit
    #[arg(short = 'v', long = "version")]
    version: bool,
    /// Take Trello, Slack and GitHub credentials from the environment
    #[arg(long)]
    osenv: bool,
    /// Path to scrumbot.toml
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

fn init_logging(config: &AppConfig) {
    use scrumbot_core::config::LogFormat::*;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.to_ascii_lowercase()));

    match config.logging.format {
        Compact => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).compact().init();
        }
        Pretty => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).pretty().init();
        }
        Json => {
            tracing_subscriber::fmt().with_target(false).with_env_filter(filter).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run(Args::parse()).await
}

async fn run(args: Args) -> Result<()> {
    if args.version {
        println!("I'm scrumbot version {VERSION}");
        return Ok(());
    }

    // Config and logging come first so bootstrap failures are logged in the configured format.
    let config = AppConfig::load(LoadOptions {
        require_file: args.config.is_some(),
        config_path: args.config,
        credentials_from_env: args.osenv,
        ..LoadOptions::default()
    })?;
    init_logging(&config);

    let app = bootstrap::bootstrap_with_config(config).await?;

    health::spawn(
        &app.config.server.bind_address,
        app.config.server.health_check_port,
        app.db_pool.clone(),
    )
    .await?;

    if args.nocron {
        tracing::info!(event_name = "scheduler.load.skipped", "started with --nocron, cron jobs not loaded");
    } else {
        match app.scheduler.load().await {
            Ok(report) => tracing::info!(
                event_name = "scheduler.load.completed",
                scheduled = report.scheduled,
                skipped = report.skipped,
                "cron table loaded"
            ),
            Err(error) => tracing::warn!(
                event_name = "scheduler.load.failed",
                error = %error,
                "started without cron jobs"
            ),
        }
    }

    app.workflows
        .log_to_slack(&format!("*Hi I'm starting up after being stopped!* - Version `{VERSION}`"))
        .await;
    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        version = VERSION,
        "scrumbot-server started"
    );

    let runner = app.slack_runner();
    let socket = tokio::spawn(async move {
        if let Err(error) = runner.start().await {
            tracing::error!(event_name = "ingress.slack.runner_failed", error = %error, "socket mode runner stopped");
        }
    });

    tokio::select! {
        signal = tokio::signal::ctrl_c() => signal?,
        _ = app.shutdown.notified() => {}
    }

    tracing::info!(event_name = "system.server.stopping", correlation_id = "shutdown", "scrumbot-server stopping");
    app.scheduler.halt().await;
    socket.abort();
    let grace = Duration::from_secs(app.config.server.graceful_shutdown_secs);
    if tokio::time::timeout(grace, app.db_pool.close()).await.is_err() {
        tracing::warn!(event_name = "system.server.close_timeout", "database pool did not close in time");
    }

    Ok(())
}
