//! # Sunlapse
//!
//! One binary, three modes:
//!
//! - `--run` executes a full production pass (fetch, composite, encode,
//!   retention) and exits with the pass's outcome code. This is what cron
//!   invokes daily.
//! - `--status` prints the last run's health snapshot.
//! - `--validate <path>` checks a frame file or directory against the
//!   compositing contract.
//!
//! Exit codes: 0 success, 1 fatal, 2 no frames, 3 partial errors, 4 busy,
//! 5 insufficient disk, 130 interrupted.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use sunlapse_config::Config;
use sunlapse_core::{
    FrameStore, HttpFetcher, RunController, validate::validate_path,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Command line arguments for the Sunlapse pipeline.
#[derive(Parser, Debug)]
#[command(name = "sunlapse")]
#[command(about = "Daily solar time-lapse production pipeline")]
#[command(group = clap::ArgGroup::new("mode")
    .required(true)
    .args(["run", "status", "validate"]))]
struct Args {
    /// Execute one production pass and exit
    #[arg(long)]
    run: bool,

    /// Print the last run's health snapshot
    #[arg(long)]
    status: bool,

    /// Validate a frame file or a frames/base directory
    #[arg(long, value_name = "FRAME_PATH")]
    validate: Option<PathBuf>,

    /// Base directory for frames, videos, and state
    #[arg(long, env = "BASE_DIR")]
    base_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let (mut config, warnings) =
        Config::load_from_env().context("configuration rejected")?;
    for warning in &warnings {
        warn!("config: {}", warning.0);
    }
    if let Some(base_dir) = &args.base_dir {
        config.storage.base_dir = base_dir.clone();
    }

    if args.status {
        return status(&config).await;
    }
    if let Some(path) = &args.validate {
        return validate(path, &config).await;
    }

    run(config).await
}

/// `--run`: one full production pass under signal protection.
async fn run(config: Config) -> anyhow::Result<()> {
    let cancel = CancellationToken::new();
    spawn_signal_listener(cancel.clone());

    let config = Arc::new(config);
    let fetcher = Arc::new(HttpFetcher::new(&config.fetch)?);
    let controller = RunController::new(config, fetcher, cancel);

    let outcome = controller.execute().await;
    info!(outcome = outcome.label(), "run finished");
    std::process::exit(outcome.exit_code());
}

/// `--status`: dump the last health snapshot.
async fn status(config: &Config) -> anyhow::Result<()> {
    let store = FrameStore::new(&config.storage);
    match store.load_health().await? {
        Some(snapshot) => {
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
            Ok(())
        }
        None => {
            println!("no completed runs recorded");
            Ok(())
        }
    }
}

/// `--validate`: check frames against the compositing contract.
async fn validate(path: &PathBuf, config: &Config) -> anyhow::Result<()> {
    let report = validate_path(path, config).await?;

    println!(
        "checked {} frame{}, {} failure{}",
        report.checked,
        if report.checked == 1 { "" } else { "s" },
        report.failures.len(),
        if report.failures.len() == 1 { "" } else { "s" },
    );
    for failure in &report.failures {
        println!("  {failure}");
    }

    if !report.is_clean() {
        std::process::exit(1);
    }
    Ok(())
}

/// SIGINT/SIGTERM trip the run-wide cancellation token; the controller
/// flushes state and exits with the interrupted code.
fn spawn_signal_listener(cancel: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            let mut term = match tokio::signal::unix::signal(
                tokio::signal::unix::SignalKind::terminate(),
            ) {
                Ok(term) => term,
                Err(err) => {
                    warn!("cannot install SIGTERM handler: {err}");
                    let _ = tokio::signal::ctrl_c().await;
                    cancel.cancel();
                    return;
                }
            };
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }

        info!("shutdown signal received, draining");
        cancel.cancel();
    });
}
