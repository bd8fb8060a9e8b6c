#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

//! Harvest pipeline: watches a download directory, waits for files to
//! finish, and copies each qualified artifact into the target root exactly
//! once per run.
//!
//! The pipeline is assembled from small seams so each stage can be tested
//! alone: [`PathFilter`] qualifies paths, [`LockProbe`] skips files still
//! held open, [`CompletionWaiter`] waits for sizes to settle,
//! [`CopyEngine`] performs verified copies under a retry policy, and
//! [`SyncLoop`] drives the whole thing off a [`CandidateSource`].

mod copy;
mod error;
mod filter;
mod lock;
mod scanner;
mod stability;
mod sync;

pub use copy::{CopiedLedger, CopyEngine, CopyOutcome, DEFAULT_CHUNK_SIZE, RetryPolicy};
pub use error::{CoreError, CoreResult, FailureKind, classify};
pub use filter::PathFilter;
pub use lock::LockProbe;
pub use scanner::{
    ArtifactCandidate, CandidateSource, PollingSource, SweepPrompt, WatchSource,
    prune_empty_dirs, sweep_watch_root,
};
pub use stability::{CompletionWaiter, SizeHistory, StabilityOutcome};
pub use sync::SyncLoop;
