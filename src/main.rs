// Entrypoint for the bundle deploy CLI.
// - Keeps `main` small: parse args, load the config, hand it to the UI.
// - Returns `anyhow::Result` so any failure exits non-zero with context.

use std::path::PathBuf;

use anyhow::Context;
use bundle_deploy::{config::UploadConfig, ui};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Package a static build and publish it to the asset-hosting service.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Config file (defaults to ./bundle-deploy.json, then ~/.bundle-deploy.json).
    #[arg(short, long, env = "BUNDLE_DEPLOY_CONFIG")]
    config: Option<PathBuf>,

    /// Upload this archive instead of packing `static_path`.
    #[arg(short, long)]
    bundle: Option<PathBuf>,

    /// Directory for resolving the bundle and static paths.
    #[arg(long)]
    work_dir: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let path = UploadConfig::locate(args.config.as_deref())?;
    let mut config = UploadConfig::from_file(&path)?;
    tracing::info!(config = %path.display(), app_id = %config.app_id, "configuration loaded");
    if let Some(bundle) = args.bundle {
        config.bundle_file = Some(bundle);
    }
    if let Some(dir) = args.work_dir {
        config.work_dir = Some(dir);
    }

    // Ctrl-C cancels the run instead of killing it mid-write.
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    let result = ui::run_with_progress(&config, cancel).await;
    ui::report(&result);
    let upload = result.context("bundle upload failed")?;
    tracing::debug!(version = %upload.version, "finished");
    Ok(())
}
