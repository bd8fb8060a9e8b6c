//! Copy-with-retry-and-verification protocol and the copied-file ledger.

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use harvest_config::RetrySettings;
use harvest_events::{Event, EventBus};
use tracing::{debug, warn};

use crate::error::{FailureKind, classify};
use crate::scanner::ArtifactCandidate;

/// Chunk size for the bounded-memory transfer loop.
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Terminal outcomes of a copy dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopyOutcome {
    /// The artifact was copied, verified, and recorded in the ledger.
    Copied,
    /// The destination already existed; trusted as-is, ledger untouched.
    AlreadyExists,
    /// Every permitted attempt failed; the candidate is skipped this tick.
    Failed {
        /// Description of the final failure.
        reason: String,
    },
}

/// Names already copied during this process's lifetime.
///
/// Grows monotonically; reset only on restart. The destination directory
/// remains the durable record — the ledger is an optimisation that avoids
/// re-dispatching work for names this run has already handled.
#[derive(Debug, Default)]
pub struct CopiedLedger {
    names: HashSet<String>,
}

impl CopiedLedger {
    /// Record a successfully copied name.
    pub fn insert(&mut self, name: &str) {
        self.names.insert(name.to_string());
    }

    /// Whether the name was already copied this run.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Number of recorded names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether the ledger is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Backoff policy for copy retries.
///
/// Expressed as a pure function of the attempt number and failure class so
/// it can be exercised without filesystem I/O.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Attempts permitted before the candidate is dropped for the tick.
    pub max_attempts: u32,
    /// Base delay between attempts.
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Build a policy from configuration.
    #[must_use]
    pub const fn new(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts,
            base_delay: settings.base_delay(),
        }
    }

    /// Whether another attempt is permitted after `attempt` failed.
    #[must_use]
    pub const fn should_retry(&self, attempt: u32, kind: FailureKind) -> bool {
        !matches!(kind, FailureKind::Permanent) && attempt < self.max_attempts
    }

    /// Delay before the attempt following failed attempt `attempt`.
    ///
    /// Lock-class failures double the base delay per attempt; other
    /// transient failures wait the base delay.
    #[must_use]
    pub const fn delay_for(&self, attempt: u32, kind: FailureKind) -> Duration {
        match kind {
            FailureKind::Locked => {
                let exponent = attempt.saturating_sub(1);
                let exponent = if exponent > 16 { 16 } else { exponent };
                self.base_delay.saturating_mul(1_u32 << exponent)
            }
            FailureKind::Transient | FailureKind::Permanent => self.base_delay,
        }
    }
}

/// Run an operation under a retry policy, sleeping between attempts.
///
/// `on_failure` observes every failed attempt (for event emission) before
/// the policy decides whether to retry.
pub(crate) async fn with_retry<T>(
    policy: &RetryPolicy,
    mut op: impl FnMut(u32) -> io::Result<T>,
    mut on_failure: impl FnMut(u32, &io::Error),
) -> Result<T, io::Error> {
    let mut attempt = 1u32;
    loop {
        match op(attempt) {
            Ok(value) => return Ok(value),
            Err(err) => {
                let kind = classify(&err);
                on_failure(attempt, &err);
                if !policy.should_retry(attempt, kind) {
                    return Err(err);
                }
                tokio::time::sleep(policy.delay_for(attempt, kind)).await;
                attempt += 1;
            }
        }
    }
}

/// Performs verified copies into the target root and owns the ledger.
#[derive(Debug)]
pub struct CopyEngine {
    target_root: PathBuf,
    mirror_tree: bool,
    chunk_size: usize,
    retry: RetryPolicy,
    ledger: CopiedLedger,
    events: EventBus,
}

impl CopyEngine {
    /// Build an engine copying into `target_root`.
    #[must_use]
    pub fn new(
        target_root: impl Into<PathBuf>,
        mirror_tree: bool,
        retry: RetryPolicy,
        events: EventBus,
    ) -> Self {
        Self {
            target_root: target_root.into(),
            mirror_tree,
            chunk_size: DEFAULT_CHUNK_SIZE,
            retry,
            ledger: CopiedLedger::default(),
            events,
        }
    }

    /// Whether this run already copied a file with the given name.
    #[must_use]
    pub fn already_copied(&self, name: &str) -> bool {
        self.ledger.contains(name)
    }

    /// Read access to the ledger.
    #[must_use]
    pub const fn ledger(&self) -> &CopiedLedger {
        &self.ledger
    }

    /// Destination path for a candidate under the configured layout.
    #[must_use]
    pub fn destination_for(&self, candidate: &ArtifactCandidate) -> PathBuf {
        if self.mirror_tree {
            self.target_root.join(&candidate.relative_path)
        } else {
            self.target_root.join(&candidate.name)
        }
    }

    /// Copy the candidate into the target root.
    ///
    /// An existing destination is trusted as-is and reported without
    /// touching the ledger. Otherwise the transfer runs chunked, verifies
    /// the destination size against the size observed at dispatch time, and
    /// retries lock-class and transient failures under the policy.
    pub async fn copy(&mut self, candidate: &ArtifactCandidate) -> CopyOutcome {
        let destination = self.destination_for(candidate);
        if destination.exists() {
            debug!(name = %candidate.name, "destination already exists, skipping");
            let _ = self.events.publish(Event::CopySkipped {
                name: candidate.name.clone(),
            });
            return CopyOutcome::AlreadyExists;
        }

        let events = self.events.clone();
        let name = candidate.name.clone();
        let result = with_retry(
            &self.retry,
            |attempt| {
                let _ = events.publish(Event::CopyAttempt {
                    name: name.clone(),
                    attempt,
                });
                transfer(
                    &candidate.path,
                    &destination,
                    candidate.size_bytes,
                    self.chunk_size,
                )
            },
            |attempt, err| {
                warn!(
                    name = %name,
                    attempt,
                    error = %err,
                    "copy attempt failed"
                );
                let _ = events.publish(Event::CopyFailed {
                    name: name.clone(),
                    attempt,
                    message: err.to_string(),
                });
            },
        )
        .await;

        match result {
            Ok(()) => {
                self.ledger.insert(&candidate.name);
                let _ = self.events.publish(Event::CopyCompleted {
                    name: candidate.name.clone(),
                    size_bytes: candidate.size_bytes,
                });
                CopyOutcome::Copied
            }
            Err(err) => CopyOutcome::Failed {
                reason: err.to_string(),
            },
        }
    }
}

/// Chunked transfer with post-copy size verification.
///
/// The destination is verified against the size observed at dispatch time
/// rather than a re-stat of the source, so a source deleted mid-copy cannot
/// skew the check. A failed transfer removes the partial destination so a
/// later pass does not mistake it for a finished copy.
fn transfer(source: &Path, destination: &Path, expected_size: u64, chunk_size: usize) -> io::Result<()> {
    let result = transfer_once(source, destination, expected_size, chunk_size);
    if result.is_err() {
        let _ = fs::remove_file(destination);
    }
    result
}

fn transfer_once(
    source: &Path,
    destination: &Path,
    expected_size: u64,
    chunk_size: usize,
) -> io::Result<()> {
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut reader = File::open(source)?;
    let mut writer = File::create(destination)?;
    let mut buffer = vec![0u8; chunk_size];
    loop {
        let read = reader.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        writer.write_all(&buffer[..read])?;
    }
    writer.flush()?;
    drop(writer);

    let actual = fs::metadata(destination)?.len();
    if actual != expected_size {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("destination size {actual} does not match dispatch size {expected_size}"),
        ));
    }
    Ok(())
}
