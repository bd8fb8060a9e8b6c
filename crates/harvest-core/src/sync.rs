//! The harvest loop: scan, qualify, wait for completion, copy, prune.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use harvest_config::HarvestConfig;
use harvest_events::{Event, EventBus};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::copy::{CopyEngine, CopyOutcome, RetryPolicy};
use crate::filter::PathFilter;
use crate::lock::LockProbe;
use crate::scanner::{
    ArtifactCandidate, CandidateSource, SweepPrompt, prune_empty_dirs, sweep_watch_root,
};
use crate::stability::{CompletionWaiter, StabilityOutcome};

/// Loop phase. The priming pass handles content that predates startup; the
/// loop then settles into steady-state ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopState {
    Priming,
    Steady,
}

/// Drives the pipeline: one tick scans the watch root, processes each
/// candidate in isolation, and prunes empty directories left behind.
pub struct SyncLoop {
    watch_root: PathBuf,
    scan_interval: Duration,
    sweep_prompt_interval: Duration,
    wait_timeout: Duration,
    filter: PathFilter,
    probe: LockProbe,
    waiter: CompletionWaiter,
    engine: CopyEngine,
    source: Box<dyn CandidateSource>,
    prompt: Arc<dyn SweepPrompt>,
    events: EventBus,
    state: LoopState,
    last_prompt: Option<Instant>,
}

impl SyncLoop {
    /// Assemble the loop from configuration and its pluggable seams.
    #[must_use]
    pub fn new(
        config: &HarvestConfig,
        source: Box<dyn CandidateSource>,
        prompt: Arc<dyn SweepPrompt>,
        events: EventBus,
    ) -> Self {
        let engine = CopyEngine::new(
            &config.target_root,
            config.mirror_tree,
            RetryPolicy::new(&config.retry),
            events.clone(),
        );
        Self {
            watch_root: config.watch_root.clone(),
            scan_interval: config.scan_interval(),
            sweep_prompt_interval: config.sweep_prompt_interval(),
            wait_timeout: config.stability.timeout(),
            filter: PathFilter::new(&config.filter),
            probe: LockProbe::new(),
            waiter: CompletionWaiter::new(&config.stability),
            engine,
            source,
            prompt,
            events,
            state: LoopState::Priming,
            last_prompt: None,
        }
    }

    /// Run until the shutdown channel signals `true` or closes.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(watch_root = %self.watch_root.display(), "harvest loop starting");
        loop {
            self.run_checkpoint().await;
            self.run_tick().await;
            if self.state == LoopState::Priming {
                self.state = LoopState::Steady;
                debug!("priming pass complete");
            }
            tokio::select! {
                () = tokio::time::sleep(self.scan_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("harvest loop stopping");
                        return;
                    }
                }
            }
        }
    }

    /// Offer the watch-root sweep when the prompt interval has elapsed.
    /// The first checkpoint (at startup) always offers it.
    ///
    /// The prompt may block on operator input, so it runs on the blocking
    /// pool; the rest of the runtime keeps making progress meanwhile.
    async fn run_checkpoint(&mut self) {
        let due = self
            .last_prompt
            .is_none_or(|at| at.elapsed() >= self.sweep_prompt_interval);
        if !due {
            return;
        }
        self.last_prompt = Some(Instant::now());
        let prompt = Arc::clone(&self.prompt);
        let approved = match tokio::task::spawn_blocking(move || prompt.confirm()).await {
            Ok(approved) => approved,
            Err(err) => {
                warn!(error = %err, "sweep prompt task failed, declining sweep");
                false
            }
        };
        if approved {
            match sweep_watch_root(&self.watch_root, &self.events) {
                Ok(removed) => info!(removed, "watch root swept"),
                Err(err) => warn!(error = %err, "watch root sweep failed"),
            }
        } else {
            let _ = self.events.publish(Event::SweepDeclined);
        }
    }

    /// One scan pass. Candidate failures are isolated; a bad file never
    /// stops the rest of the tick.
    async fn run_tick(&mut self) {
        let _ = self.events.publish(Event::ScanStarted {
            root: self.watch_root.display().to_string(),
        });
        let paths = match self.source.collect() {
            Ok(paths) => paths,
            Err(err) => {
                warn!(error = %err, "candidate collection failed, skipping tick");
                return;
            }
        };
        for path in paths {
            self.process_candidate(&path).await;
        }
        self.waiter.history_mut().drop_vanished();
        let pruned = prune_empty_dirs(&self.watch_root, &self.events);
        if pruned > 0 {
            debug!(pruned, "empty directories pruned");
        }
    }

    async fn process_candidate(&mut self, path: &Path) {
        if !self.filter.qualifies(path) {
            return;
        }
        let Some(name) = path.file_name().and_then(OsStr::to_str) else {
            return;
        };
        if self.engine.already_copied(name) {
            return;
        }
        let Ok(metadata) = path.metadata() else {
            return;
        };
        let _ = self.events.publish(Event::CandidateQualified {
            name: name.to_string(),
            size_bytes: metadata.len(),
        });

        if self.probe.is_locked(path) {
            // Still being written; the next tick will see it again.
            let _ = self.events.publish(Event::LockDetected {
                name: name.to_string(),
            });
            return;
        }

        match self.waiter.await_stable(path, self.wait_timeout).await {
            StabilityOutcome::Stable { size } => {
                let Some(candidate) = ArtifactCandidate::new(path, &self.watch_root, size) else {
                    return;
                };
                if let CopyOutcome::Failed { reason } = self.engine.copy(&candidate).await {
                    warn!(name = %name, reason = %reason, "candidate dropped for this tick");
                }
            }
            StabilityOutcome::TimedOut => {
                let _ = self.events.publish(Event::WaitTimedOut {
                    name: name.to_string(),
                });
            }
            StabilityOutcome::Vanished => {
                let _ = self.events.publish(Event::CandidateVanished {
                    name: name.to_string(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::PollingSource;
    use harvest_config::{RetrySettings, StabilitySettings};
    use std::fs;
    use std::time::Duration;
    use tokio::time::timeout;

    struct FixedPrompt(bool);

    impl SweepPrompt for FixedPrompt {
        fn confirm(&self) -> bool {
            self.0
        }
    }

    fn test_config(base: &Path) -> HarvestConfig {
        HarvestConfig {
            watch_root: base.join("watch"),
            target_root: base.join("keep"),
            scan_interval_secs: 1,
            sweep_prompt_interval_secs: 3_600,
            retry: RetrySettings {
                max_attempts: 2,
                base_delay_ms: 5,
            },
            stability: StabilitySettings {
                sample_interval_ms: 10,
                required_samples: 2,
                timeout_secs: 2,
            },
            ..HarvestConfig::default()
        }
    }

    fn sync_loop(config: &HarvestConfig, approve_sweep: bool) -> (SyncLoop, EventBus) {
        let bus = EventBus::new();
        let source = Box::new(PollingSource::new(&config.watch_root));
        let prompt = Arc::new(FixedPrompt(approve_sweep));
        (
            SyncLoop::new(config, source, prompt, bus.clone()),
            bus,
        )
    }

    #[tokio::test]
    async fn tick_copies_finished_artifact() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let config = test_config(temp.path());
        fs::create_dir_all(&config.watch_root)?;
        fs::write(config.watch_root.join("app.exe"), vec![1u8; 2_048])?;

        let (mut sync, bus) = sync_loop(&config, false);
        let before = bus.last_event_id();
        sync.run_tick().await;

        let copied = fs::metadata(config.target_root.join("app.exe"))?;
        assert_eq!(copied.len(), 2_048);

        let mut stream = bus.subscribe(Some(before.unwrap_or(0)));
        let mut saw_completed = false;
        while let Ok(Some(envelope)) =
            timeout(Duration::from_millis(100), stream.next()).await
        {
            if matches!(envelope.event, Event::CopyCompleted { .. }) {
                saw_completed = true;
            }
        }
        assert!(saw_completed);
        Ok(())
    }

    #[tokio::test]
    async fn ledger_prevents_recopy_after_destination_removal() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let config = test_config(temp.path());
        fs::create_dir_all(&config.watch_root)?;
        fs::write(config.watch_root.join("app.exe"), b"payload")?;

        let (mut sync, _bus) = sync_loop(&config, false);
        sync.run_tick().await;
        assert!(config.target_root.join("app.exe").is_file());

        // Even with the destination gone, the run's ledger still owns the name.
        fs::remove_file(config.target_root.join("app.exe"))?;
        sync.run_tick().await;
        assert!(!config.target_root.join("app.exe").exists());
        Ok(())
    }

    #[tokio::test]
    async fn incomplete_and_unlisted_files_are_ignored() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let config = test_config(temp.path());
        fs::create_dir_all(&config.watch_root)?;
        fs::write(config.watch_root.join("partial.exe.tmp"), b"partial")?;
        fs::write(config.watch_root.join("notes.txt"), b"text")?;

        let (mut sync, _bus) = sync_loop(&config, false);
        sync.run_tick().await;

        assert!(!config.target_root.join("partial.exe.tmp").exists());
        assert!(!config.target_root.join("notes.txt").exists());
        assert!(config.watch_root.join("partial.exe.tmp").is_file());
        Ok(())
    }

    #[tokio::test]
    async fn tick_prunes_empty_directories() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let config = test_config(temp.path());
        let chain = config.watch_root.join("left").join("behind");
        fs::create_dir_all(&chain)?;

        let (mut sync, _bus) = sync_loop(&config, false);
        sync.run_tick().await;

        assert!(!config.watch_root.join("left").exists());
        assert!(config.watch_root.is_dir());
        Ok(())
    }

    #[tokio::test]
    async fn declined_checkpoint_leaves_watch_root_untouched() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let config = test_config(temp.path());
        fs::create_dir_all(&config.watch_root)?;
        fs::write(config.watch_root.join("keep-me.bin"), b"payload")?;

        let (mut sync, bus) = sync_loop(&config, false);
        let before = bus.last_event_id();
        sync.run_checkpoint().await;

        assert!(config.watch_root.join("keep-me.bin").is_file());
        let mut stream = bus.subscribe(Some(before.unwrap_or(0)));
        let envelope = stream.next().await.expect("declined event");
        assert_eq!(envelope.event, Event::SweepDeclined);
        Ok(())
    }

    #[tokio::test]
    async fn approved_checkpoint_sweeps_watch_root() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let config = test_config(temp.path());
        fs::create_dir_all(&config.watch_root)?;
        fs::write(config.watch_root.join("stale.exe"), b"payload")?;

        let (mut sync, _bus) = sync_loop(&config, true);
        sync.run_checkpoint().await;

        assert_eq!(fs::read_dir(&config.watch_root)?.count(), 0);

        // The interval has not elapsed, so the next checkpoint must not prompt.
        fs::write(config.watch_root.join("fresh.exe"), b"payload")?;
        sync.run_checkpoint().await;
        assert!(config.watch_root.join("fresh.exe").is_file());
        Ok(())
    }

    #[tokio::test]
    async fn slow_prompt_does_not_stall_the_runtime() -> anyhow::Result<()> {
        struct SlowPrompt;

        impl SweepPrompt for SlowPrompt {
            fn confirm(&self) -> bool {
                std::thread::sleep(Duration::from_millis(200));
                false
            }
        }

        let temp = tempfile::tempdir()?;
        let config = test_config(temp.path());
        fs::create_dir_all(&config.watch_root)?;

        let bus = EventBus::new();
        let source = Box::new(PollingSource::new(&config.watch_root));
        let mut sync = SyncLoop::new(&config, source, Arc::new(SlowPrompt), bus);
        let checkpoint = tokio::spawn(async move { sync.run_checkpoint().await });

        // While the prompt sits on the blocking pool, timers must still fire.
        timeout(Duration::from_millis(100), tokio::time::sleep(Duration::from_millis(10)))
            .await?;
        checkpoint.await?;
        Ok(())
    }

    #[tokio::test]
    async fn shutdown_signal_stops_the_loop() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let config = test_config(temp.path());
        fs::create_dir_all(&config.watch_root)?;

        let (sync, _bus) = sync_loop(&config, false);
        let (tx, rx) = watch::channel(false);
        let task = tokio::spawn(sync.run(rx));

        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true)?;
        timeout(Duration::from_secs(5), task).await??;
        Ok(())
    }
}
