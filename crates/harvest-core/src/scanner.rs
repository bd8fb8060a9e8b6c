//! Candidate discovery over the watch root, empty-directory pruning, and
//! the interactive watch-root sweep.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use harvest_events::{Event, EventBus};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{CoreError, CoreResult};

/// A qualified file captured with the size observed at dispatch time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactCandidate {
    /// Absolute path of the source file.
    pub path: PathBuf,
    /// File name, used for the ledger and the flattened destination layout.
    pub name: String,
    /// Size observed when the candidate was dispatched; the copy verifies
    /// against it.
    pub size_bytes: u64,
    /// Path relative to the watch root, used for the mirrored layout.
    pub relative_path: PathBuf,
}

impl ArtifactCandidate {
    /// Build a candidate for a file under `root`.
    ///
    /// Returns `None` when the file name is absent or not valid UTF-8; such
    /// paths cannot be tracked in the ledger. A path outside `root` falls
    /// back to its bare file name for the relative layout.
    #[must_use]
    pub fn new(path: &Path, root: &Path, size_bytes: u64) -> Option<Self> {
        let name = path.file_name()?.to_str()?.to_string();
        let relative_path = path
            .strip_prefix(root)
            .map_or_else(|_| PathBuf::from(&name), Path::to_path_buf);
        Some(Self {
            path: path.to_path_buf(),
            name,
            size_bytes,
            relative_path,
        })
    }
}

/// Source of candidate paths for a scan tick.
///
/// Implementations return raw paths; qualification happens downstream so
/// every tick re-evaluates size, existence, and the incomplete marker.
pub trait CandidateSource: Send {
    /// Paths to consider this tick.
    ///
    /// # Errors
    ///
    /// Returns an error when the underlying source cannot be read at all;
    /// individual unreadable entries are skipped instead.
    fn collect(&mut self) -> CoreResult<Vec<PathBuf>>;
}

/// Walks the watch root on every tick.
#[derive(Debug)]
pub struct PollingSource {
    root: PathBuf,
}

impl PollingSource {
    /// Build a source polling `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl CandidateSource for PollingSource {
    fn collect(&mut self) -> CoreResult<Vec<PathBuf>> {
        if !self.root.exists() {
            debug!(root = %self.root.display(), "watch root absent, nothing to scan");
            return Ok(Vec::new());
        }
        let mut paths = Vec::new();
        for entry in WalkDir::new(&self.root) {
            match entry {
                Ok(entry) if entry.file_type().is_file() => {
                    paths.push(entry.into_path());
                }
                Ok(_) => {}
                Err(err) => {
                    // Entries can vanish mid-walk; skip and keep scanning.
                    warn!(root = %self.root.display(), error = %err, "scan entry skipped");
                }
            }
        }
        Ok(paths)
    }
}

/// Subscribes to filesystem change notifications and drains them per tick.
///
/// Only create and modify events are forwarded; the downstream filter
/// rejects anything that is not a qualified file by the time it is drained.
pub struct WatchSource {
    root: PathBuf,
    receiver: mpsc::UnboundedReceiver<PathBuf>,
    _watcher: RecommendedWatcher,
}

impl WatchSource {
    /// Start watching `root` recursively.
    ///
    /// # Errors
    ///
    /// Returns an error when the root does not exist or the platform
    /// watcher cannot be created.
    pub fn new(root: impl Into<PathBuf>) -> CoreResult<Self> {
        let root = root.into();
        let (sender, receiver) = mpsc::unbounded_channel();
        let watch_sender = sender.clone();
        let mut watcher = notify::recommended_watcher(
            move |result: Result<notify::Event, notify::Error>| match result {
                Ok(event)
                    if matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) =>
                {
                    for path in event.paths {
                        let _ = watch_sender.send(path);
                    }
                }
                Ok(_) => {}
                Err(err) => warn!(error = %err, "filesystem watcher error"),
            },
        )
        .map_err(|err| CoreError::watch("create watcher", &root, err))?;
        watcher
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|err| CoreError::watch("watch root", &root, err))?;

        // Files already on disk never produce change events; seed them so
        // the first drain covers pre-existing content.
        for entry in WalkDir::new(&root) {
            match entry {
                Ok(entry) if entry.file_type().is_file() => {
                    let _ = sender.send(entry.into_path());
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(root = %root.display(), error = %err, "seed entry skipped");
                }
            }
        }

        Ok(Self {
            root,
            receiver,
            _watcher: watcher,
        })
    }
}

impl CandidateSource for WatchSource {
    fn collect(&mut self) -> CoreResult<Vec<PathBuf>> {
        let mut seen = HashSet::new();
        let mut paths = Vec::new();
        while let Ok(path) = self.receiver.try_recv() {
            if seen.insert(path.clone()) {
                paths.push(path);
            }
        }
        debug!(root = %self.root.display(), drained = paths.len(), "watch queue drained");
        Ok(paths)
    }
}

/// Remove directories under `root` that are empty, deepest first, so a
/// chain of nested empty directories disappears in a single pass.
///
/// Removal races with concurrent writers are tolerated: a directory that
/// gains an entry between the emptiness check and the removal is reported
/// and left in place.
pub fn prune_empty_dirs(root: &Path, events: &EventBus) -> usize {
    let mut removed = 0;
    for entry in WalkDir::new(root).min_depth(1).contents_first(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                debug!(root = %root.display(), error = %err, "prune entry skipped");
                continue;
            }
        };
        if !entry.file_type().is_dir() || !dir_is_empty(entry.path()) {
            continue;
        }
        match fs::remove_dir(entry.path()) {
            Ok(()) => {
                removed += 1;
                let _ = events.publish(Event::DirRemoved {
                    path: entry.path().display().to_string(),
                });
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                let _ = events.publish(Event::DirRemovalFailed {
                    path: entry.path().display().to_string(),
                    message: err.to_string(),
                });
            }
        }
    }
    removed
}

fn dir_is_empty(path: &Path) -> bool {
    fs::read_dir(path).is_ok_and(|mut entries| entries.next().is_none())
}

/// Asks whether the watch root may be cleared at a sweep checkpoint.
///
/// `confirm` may block on operator input; callers run it off the async
/// workers.
pub trait SweepPrompt: Send + Sync {
    /// Whether the operator approved the sweep.
    fn confirm(&self) -> bool;
}

/// Remove every entry directly under `root`, recursing into directories.
///
/// A missing root sweeps nothing. Entries that cannot be removed are
/// logged and skipped; the sweep reports only what it actually removed.
///
/// # Errors
///
/// Returns an error when the root itself cannot be listed.
pub fn sweep_watch_root(root: &Path, events: &EventBus) -> CoreResult<usize> {
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(err) => return Err(CoreError::io("sweep read_dir", root, err)),
    };

    let mut removed = 0;
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!(root = %root.display(), error = %err, "sweep entry unreadable");
                continue;
            }
        };
        let path = entry.path();
        let result = if path.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        match result {
            Ok(()) => removed += 1,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => {
                warn!(path = %path.display(), error = %err, "sweep removal failed");
            }
        }
    }
    let _ = events.publish(Event::SweepCompleted { removed });
    Ok(removed)
}
