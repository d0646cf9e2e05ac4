/// Tunesort Daemon - routes downloaded music out of a watched folder
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tunesort_router::{
    reaper::IdleFolderReaper,
    registry::{ActivityRegistry, ProcessedSet},
    transcode::{FfmpegEncoder, TranscodeGate},
    watcher::{FolderWatcher, WatchLoop},
    Router,
};
use tunesortd::{logging, DaemonConfig, DaemonError};

#[derive(Parser)]
#[command(name = "tunesortd")]
#[command(about = "Sort downloaded music into library folders", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "TUNESORT_CONFIG")]
    config: Option<PathBuf>,

    /// Log routing decisions without moving, deleting or transcoding
    #[arg(long)]
    dry_run: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch the download folder until interrupted (default)
    Run,
    /// Validate the configuration and print the effective settings
    CheckConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = DaemonConfig::load(cli.config.as_deref())?;
    if cli.dry_run {
        config.routing.dry_run = true;
    }
    config.validate()?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(config).await?,
        Commands::CheckConfig => check_config(&config)?,
    }

    Ok(())
}

fn check_config(config: &DaemonConfig) -> anyhow::Result<()> {
    for warning in config.warnings() {
        eprintln!("warning: {}", warning);
    }
    print!("{}", config.to_toml()?);
    Ok(())
}

async fn run(config: DaemonConfig) -> anyhow::Result<()> {
    logging::init(&config.paths.log_file)?;
    for warning in config.warnings() {
        tracing::warn!("{}", warning);
    }

    let configured = config.destinations();
    if !configured.watch_root.is_dir() {
        return Err(DaemonError::Config(format!(
            "Watch root {:?} does not exist or is not a directory",
            configured.watch_root
        ))
        .into());
    }
    for folder in [
        &configured.library,
        &configured.no_artist,
        &configured.transcoded,
    ] {
        tokio::fs::create_dir_all(folder).await?;
    }
    // Event paths arrive absolute and symlink-free
    let destinations = configured.canonicalize().await?;

    tracing::info!("Starting tunesortd");
    tracing::info!("Watching: {:?}", destinations.watch_root);
    tracing::info!(
        "Idle timeout: {}s, sweep interval: {}s",
        config.reaper.idle_timeout_secs,
        config.reaper.sweep_interval_secs
    );
    if config.routing.dry_run {
        tracing::info!("Dry run: no file will be moved, deleted or transcoded");
    }

    let registry = Arc::new(ActivityRegistry::new());
    let processed = Arc::new(ProcessedSet::new());

    let encoder = FfmpegEncoder::new(
        config.transcode.ffmpeg_path.clone(),
        config.transcode.bitrate.clone(),
    );
    let gate = TranscodeGate::new(Arc::new(encoder))
        .with_target_extension(config.transcode.target_extension.clone());

    let router = Router::new(
        destinations.clone(),
        gate,
        Arc::clone(&registry),
        processed,
    )
    .with_rules(config.extension_rules())
    .with_dry_run(config.routing.dry_run);

    let reaper = IdleFolderReaper::new(registry, destinations.watch_root.clone())
        .with_timeout(config.idle_timeout());

    let (watcher, events) =
        FolderWatcher::start(&destinations.watch_root, &config.watcher_config())?;

    let stats = WatchLoop::new(router, reaper, config.sweep_interval())
        .run(events, shutdown_signal())
        .await;

    watcher.stop();
    tracing::info!(
        "Stopped: {} moved, {} deleted, {} transcoded, {} skipped, {} failed, {} folder(s) reaped",
        stats.moved,
        stats.deleted,
        stats.transcoded,
        stats.skipped,
        stats.failed,
        stats.reaped
    );

    Ok(())
}

/// Resolves on Ctrl-C
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}
