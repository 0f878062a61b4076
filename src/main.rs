use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use std::io::Read;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use usdz_converter::app;
use usdz_converter::config::settings::AppConfig;
use usdz_converter::infrastructure::ledger::processed::ProcessedLedger;
use usdz_converter::infrastructure::storage::s3::is_source_key;
use usdz_converter::modules::events::{EventHandler, S3Notification};
use usdz_converter::modules::pipeline::WorkItem;
use usdz_converter::telemetry;
use usdz_converter::workers::discovery::{DiscoverySettings, DiscoveryWorker};

/// USDZ to GLB conversion service.
#[derive(Parser)]
#[clap(name = "usdz-converter", version, about = "Converts USDZ uploads to GLB and republishes them")]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll the configured bucket/prefix until interrupted
    Daemon,
    /// Handle one object-created notification and print the result payload
    Handle {
        /// Path to the notification JSON, or `-` for stdin
        #[clap(long, default_value = "-")]
        event: PathBuf,
    },
    /// Convert a single key now, regardless of the processed ledger
    Convert {
        /// Source object key, e.g. staging/floor-plan/demo.usdz
        key: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let cli = Cli::parse();

    let config = AppConfig::new().context("AWS credentials must be set in the environment")?;
    let _log_guard = telemetry::init(config.log_dir.as_deref());

    match cli.command {
        Commands::Daemon => run_daemon(config).await,
        Commands::Handle { event } => run_handler(config, &event).await,
        Commands::Convert { key } => run_convert(config, &key).await,
    }
}

async fn run_daemon(config: AppConfig) -> anyhow::Result<()> {
    let bucket = config
        .bucket
        .clone()
        .context("S3_BUCKET must be set in daemon mode")?;
    std::fs::create_dir_all(&config.work_dir)
        .with_context(|| format!("cannot create {}", config.work_dir.display()))?;
    let ledger = ProcessedLedger::load(config.ledger_path()).context("cannot load processed ledger")?;

    info!("Starting USDZ to GLB conversion service...");
    info!(bucket = %bucket, prefix = %config.prefix, "monitoring");

    let settings = DiscoverySettings {
        bucket: bucket.clone(),
        prefix: config.prefix.clone(),
        check_interval: config.check_interval,
        item_delay: config.item_delay,
        mark_failed_processed: config.mark_failed_processed,
        work_dir: config.work_dir.clone(),
    };
    let state = app::create_state(config, &bucket);

    let shutdown = CancellationToken::new();
    tokio::spawn(watch_signals(shutdown.clone()));

    DiscoveryWorker::new(state.pipeline(), ledger, settings)
        .run(shutdown)
        .await;

    info!("Service stopped");
    Ok(())
}

async fn run_handler(config: AppConfig, event: &Path) -> anyhow::Result<()> {
    let raw = if event == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("cannot read notification from stdin")?;
        buf
    } else {
        std::fs::read_to_string(event)
            .with_context(|| format!("cannot read {}", event.display()))?
    };
    let notification: S3Notification =
        serde_json::from_str(&raw).context("notification is not valid JSON")?;

    let bucket = notification
        .target()
        .map(|t| t.bucket)
        .or_else(|| config.bucket.clone())
        .unwrap_or_default();
    let scratch_root = config.work_dir.clone();
    let state = app::create_state(config, &bucket);

    let handler = EventHandler::new(state.pipeline(), Some(scratch_root));
    let response = handler.handle(&notification).await;

    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

async fn run_convert(config: AppConfig, key: &str) -> anyhow::Result<()> {
    let key = key.trim();
    if !is_source_key(key) {
        bail!("{key} is not a .usdz object");
    }
    let bucket = config
        .bucket
        .clone()
        .context("S3_BUCKET must be set to convert a single key")?;
    let mut ledger = ProcessedLedger::load(config.ledger_path()).context("cannot load processed ledger")?;
    let work_dir = config.work_dir.clone();
    let state = app::create_state(config, &bucket);

    let mut item = WorkItem::new(key, &work_dir);
    match state.pipeline().process(&mut item, Some(&mut ledger)).await {
        Ok(outcome) => {
            info!(input = %outcome.input, output = %outcome.output, "conversion successful");
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            Ok(())
        }
        Err(e) => {
            error!(key = %key, kind = e.kind(), error = %e, "conversion failed");
            Err(e.into())
        }
    }
}

async fn watch_signals(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                error!(error = %e, "cannot install SIGTERM handler, only Ctrl-C will stop the service");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    info!("Shutdown requested, finishing current item");
    shutdown.cancel();
}
