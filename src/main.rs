//! Argus snapshot service: keep every configured camera's latest frame fresh
//! and persist a snapshot of each on a fixed schedule.

use std::path::PathBuf;
use std::sync::Arc;

use argus::capture;
use argus::session::{CommandUnlocker, HttpProbe, SessionRegistry};
use argus::snapshot::SnapshotStore;
use argus::{CaptureOutcome, Config};
use color_eyre::{eyre::eyre, Result};
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize error handling and logging
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("argus=info")),
        )
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();

    info!("Argus launching...");

    // Load configuration
    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = Config::load(config_path.as_deref())?;
    if config.cameras.is_empty() {
        return Err(eyre!("no cameras configured"));
    }

    let store = Arc::new(SnapshotStore::open(&config.storage.snapshot_dir)?);
    info!("Snapshots go to {}", store.dir().display());

    // Ctrl-C cancels establishment, the scrape schedule and every decode loop
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown requested");
        }
        on_signal.cancel();
    });

    let probe = HttpProbe::new(config.session.probe_timeout())?;
    let unlocker = CommandUnlocker::new(config.session.unlock_command.clone());
    let capture_interval = config.storage.capture_interval();
    let cameras = config.cameras.clone();

    // Cameras come up independently; scraping starts with whichever is ready
    let registry = Arc::new(SessionRegistry::new(config, Arc::clone(&store)));
    let mut opening = {
        let registry = Arc::clone(&registry);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            registry
                .open_all(cameras, &probe, &unlocker, capture::open_source, &cancel)
                .await
                .iter()
                .filter(|(_, result)| result.is_ok())
                .count()
        })
    };
    let mut establishing = true;

    let mut ticker = time::interval(capture_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            opened = &mut opening, if establishing => {
                establishing = false;
                match opened {
                    Ok(0) => {
                        error!("No camera session could be opened");
                        cancel.cancel();
                        break;
                    }
                    Ok(n) => info!("{} camera session(s) open", n),
                    Err(e) => {
                        error!("Session establishment failed: {}", e);
                        cancel.cancel();
                        break;
                    }
                }
                continue;
            }
            _ = ticker.tick() => {}
        }

        let registry = Arc::clone(&registry);
        let scrape = tokio::task::spawn_blocking(move || {
            for camera_id in registry.camera_ids() {
                match registry.capture(&camera_id) {
                    Ok(CaptureOutcome::Saved(snapshot)) => {
                        debug!("Camera {} -> {}", camera_id, snapshot.identity)
                    }
                    Ok(CaptureOutcome::NoFrameAvailable) => {
                        debug!("Camera {} has no frame yet", camera_id)
                    }
                    Err(e) => warn!("Snapshot for camera {} failed: {}", camera_id, e),
                }
            }
        });
        if let Err(e) = scrape.await {
            error!("Scrape task failed: {}", e);
        }
    }

    // Establishment still running sees the cancellation and opens nothing more
    if establishing {
        if let Err(e) = opening.await {
            error!("Session establishment failed: {}", e);
        }
    }
    let nothing_opened = registry.is_empty();
    tokio::task::spawn_blocking(move || registry.shutdown()).await?;

    if nothing_opened {
        return Err(eyre!("no camera session could be opened"));
    }
    info!("Argus shutting down");
    Ok(())
}
