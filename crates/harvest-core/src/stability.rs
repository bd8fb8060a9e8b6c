//! File-completion heuristic: a file is "stable" once its size stops
//! changing for a configured number of consecutive samples.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use harvest_config::StabilitySettings;
use tokio::time::Instant;
use tracing::debug;

/// Terminal outcomes of waiting for a file to stabilise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StabilityOutcome {
    /// Size was identical for the required consecutive samples.
    Stable {
        /// Size observed at the final sample; the copy verifies against it.
        size: u64,
    },
    /// The deadline passed before the file stabilised.
    TimedOut,
    /// The file disappeared between samples.
    Vanished,
}

/// Last observed size per path, kept across ticks so a candidate that timed
/// out resumes from its previous observation.
#[derive(Debug, Default)]
pub struct SizeHistory {
    last_seen: HashMap<PathBuf, u64>,
}

impl SizeHistory {
    /// Record an observation and return the previously recorded size.
    pub fn observe(&mut self, path: &Path, size: u64) -> Option<u64> {
        self.last_seen.insert(path.to_path_buf(), size)
    }

    /// Last recorded size for a path, if any.
    #[must_use]
    pub fn last(&self, path: &Path) -> Option<u64> {
        self.last_seen.get(path).copied()
    }

    /// Drop the entry for a path.
    pub fn forget(&mut self, path: &Path) {
        self.last_seen.remove(path);
    }

    /// Drop entries whose path no longer exists on disk.
    pub fn drop_vanished(&mut self) {
        self.last_seen.retain(|path, _| path.exists());
    }

    /// Number of tracked paths.
    #[must_use]
    pub fn len(&self) -> usize {
        self.last_seen.len()
    }

    /// Whether no paths are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.last_seen.is_empty()
    }
}

/// Observes a file's size over time and declares it stable or timed out.
///
/// The heuristic is deliberately crude: it cannot distinguish "finished"
/// from "paused download", but it is the best available signal without
/// cooperation from the writer process.
#[derive(Debug)]
pub struct CompletionWaiter {
    sample_interval: Duration,
    required_samples: u32,
    history: SizeHistory,
}

impl CompletionWaiter {
    /// Build a waiter from configuration.
    #[must_use]
    pub fn new(settings: &StabilitySettings) -> Self {
        Self {
            sample_interval: settings.sample_interval(),
            required_samples: settings.required_samples.max(1),
            history: SizeHistory::default(),
        }
    }

    /// Access the size history for inter-tick maintenance.
    pub fn history_mut(&mut self) -> &mut SizeHistory {
        &mut self.history
    }

    /// Sample the file's size once per interval until it is unchanged for
    /// the required number of consecutive samples, the deadline passes, or
    /// the file disappears.
    pub async fn await_stable(&mut self, path: &Path, timeout: Duration) -> StabilityOutcome {
        let deadline = Instant::now() + timeout;
        // A size recorded by an earlier wait counts as one sample, so a
        // candidate that timed out resumes instead of starting over.
        let mut run_size = self.history.last(path);
        let mut run_length = u32::from(run_size.is_some());

        loop {
            let size = match fs::metadata(path) {
                Ok(metadata) => metadata.len(),
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    self.history.forget(path);
                    return StabilityOutcome::Vanished;
                }
                Err(err) => {
                    debug!(path = %path.display(), error = %err, "size sample failed");
                    run_length = 0;
                    run_size = None;
                    if Instant::now() >= deadline {
                        return StabilityOutcome::TimedOut;
                    }
                    tokio::time::sleep(self.sample_interval).await;
                    continue;
                }
            };

            let _ = self.history.observe(path, size);
            if run_size == Some(size) {
                run_length += 1;
            } else {
                run_size = Some(size);
                run_length = 1;
            }

            if run_length >= self.required_samples {
                self.history.forget(path);
                return StabilityOutcome::Stable { size };
            }
            if Instant::now() >= deadline {
                return StabilityOutcome::TimedOut;
            }
            tokio::time::sleep(self.sample_interval).await;
        }
    }
}
