//! Boot sequence: configuration, telemetry, event logging, and the loop.

use std::fs;
use std::sync::Arc;

use harvest_config::{HarvestConfig, ScannerStrategy, config_path, load_or_init};
use harvest_core::{CandidateSource, PollingSource, SyncLoop, WatchSource};
use harvest_events::EventBus;
use harvest_telemetry::{LoggingConfig, init_logging};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::error::{AppError, AppResult};
use crate::prompt::StdinSweepPrompt;

/// Entry point for the harvest boot sequence.
///
/// # Errors
///
/// Returns an error when telemetry cannot be installed or the target root
/// cannot be created.
pub async fn run_app() -> AppResult<()> {
    let path = config_path();
    let config = load_or_init(&path);
    init_logging(&LoggingConfig::default())
        .map_err(|err| AppError::telemetry("telemetry.init", err))?;

    info!(
        config = %path.display(),
        watch_root = %config.watch_root.display(),
        watch_root_exists = config.watch_root.exists(),
        target_root = %config.target_root.display(),
        "harvest starting"
    );
    fs::create_dir_all(&config.target_root)
        .map_err(|err| AppError::io("target_root.create", &config.target_root, err))?;

    let events = EventBus::new();
    let forwarder = spawn_event_logger(&events);
    let source = build_source(&config);
    let sync = SyncLoop::new(&config, source, Arc::new(StdinSweepPrompt::new()), events);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sync_task = tokio::spawn(sync.run(shutdown_rx));
    let signal_task = tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("interrupt received, shutting down");
                let _ = shutdown_tx.send(true);
            }
            Err(err) => error!(error = %err, "failed to listen for interrupt"),
        }
    });

    if let Err(err) = sync_task.await {
        error!(error = %err, "harvest loop task failed");
    }
    signal_task.abort();
    forwarder.abort();
    info!("harvest stopped");
    Ok(())
}

/// Build the candidate source for the configured strategy. An unavailable
/// watcher degrades to polling rather than refusing to start.
fn build_source(config: &HarvestConfig) -> Box<dyn CandidateSource> {
    if config.scanner == ScannerStrategy::Watch {
        match WatchSource::new(&config.watch_root) {
            Ok(source) => return Box::new(source),
            Err(err) => {
                warn!(error = %err, "filesystem watcher unavailable, falling back to polling");
            }
        }
    }
    Box::new(PollingSource::new(&config.watch_root))
}

/// Forward every bus event into the structured log.
fn spawn_event_logger(events: &EventBus) -> JoinHandle<()> {
    let mut stream = events.subscribe(None);
    tokio::spawn(async move {
        while let Some(envelope) = stream.next().await {
            match serde_json::to_string(&envelope.event) {
                Ok(payload) => {
                    info!(id = envelope.id, kind = envelope.event.kind(), %payload, "event");
                }
                Err(err) => {
                    warn!(id = envelope.id, error = %err, "event serialisation failed");
                }
            }
        }
    })
}
