//! Binary entrypoint for photocast.
//!
//! Wires the photo server and the three periodic tasks together and
//! supervises them until shutdown; all logic lives in the library crate.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{Level, info};
use tracing_subscriber::{EnvFilter, fmt};

use photocast::cast::CastV2Transport;
use photocast::config::Configuration;
use photocast::index::Snapshot;
use photocast::link::CastLink;
use photocast::tasks;
use photocast::web::{self, MediaUrl};

/// Simple CLI
#[derive(Debug, Parser)]
#[command(
    name = "photocast",
    about = "Casts a perpetual photo slideshow to a local display device"
)]
struct Cli {
    /// Path to YAML config file
    #[arg(short, long, value_name = "FILE", default_value = "config.yaml")]
    config: PathBuf,

    /// Increase log verbosity (repeatable)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbosity: u8) {
    // map -v to log level
    let level = match verbosity {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("photocast={level}")));
    fmt().with_env_filter(filter).with_target(true).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cfg = Configuration::from_yaml_file(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?
        .validated()
        .context("validating configuration")?;
    info!(
        device = %cfg.device_name,
        library = %cfg.photo_library_path.display(),
        "starting photocast"
    );

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::warn!("ctrl-c handler failed: {err}");
                return;
            }
            info!("ctrl-c received; initiating shutdown");
            cancel.cancel();
        });
    }

    let link = Arc::new(CastLink::new(
        CastV2Transport::new(),
        cfg.device_name.clone(),
    ));
    let (snapshot_tx, snapshot_rx) = watch::channel(Snapshot::empty());
    let urls = MediaUrl::new(
        cfg.photo_library_path.clone(),
        cfg.local_ip,
        cfg.listening_port,
    );

    let server = web::spawn(cfg.photo_library_path.clone(), cfg.bind_addr(), cancel.clone());

    let mut tasks = JoinSet::new();

    // IndexRefresh
    tasks.spawn({
        let cfg = cfg.clone();
        let cancel = cancel.clone();
        async move {
            tasks::indexer::run(cfg, snapshot_tx, cancel)
                .await
                .context("indexer task failed")
        }
    });

    // AvailabilityCheck
    tasks.spawn({
        let link = link.clone();
        let cancel = cancel.clone();
        let period = cfg.cast_check_interval;
        async move {
            tasks::availability::run(link, period, cancel)
                .await
                .context("availability task failed")
        }
    });

    // Advance
    tasks.spawn({
        let link = link.clone();
        let cancel = cancel.clone();
        let period = cfg.next_photo_interval;
        async move {
            tasks::advance::run(link, snapshot_rx, urls, period, cancel)
                .await
                .context("advance task failed")
        }
    });

    // Drain JoinSet (tasks exit on cancellation)
    while let Some(res) = tasks.join_next().await {
        match res {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!("task error: {e:?}"),
            Err(e) => tracing::error!("join error: {e}"),
        }
    }

    // Leave the device cleanly if we still hold a session.
    link.shutdown().await;
    let _ = server.await;

    Ok(())
}
