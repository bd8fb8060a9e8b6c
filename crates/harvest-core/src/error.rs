//! # Design
//!
//! - Provide structured, constant-message errors for the pipeline.
//! - Capture operation context (paths, inputs) to make failures reproducible
//!   in tests.
//! - Classify IO failures into retry classes so the backoff policy can be
//!   exercised without filesystem access.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for pipeline operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors produced by the harvest pipeline.
#[derive(Debug, Error)]
pub enum CoreError {
    /// IO failures while interacting with the filesystem.
    #[error("pipeline io failure")]
    Io {
        /// Operation that triggered the IO failure.
        operation: &'static str,
        /// Path involved in the IO failure.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// Filesystem watcher failures.
    #[error("pipeline watcher failure")]
    Watch {
        /// Operation that triggered the watcher failure.
        operation: &'static str,
        /// Path involved in the watcher failure.
        path: PathBuf,
        /// Underlying notify error.
        source: notify::Error,
    },
}

impl CoreError {
    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn watch(
        operation: &'static str,
        path: impl Into<PathBuf>,
        source: notify::Error,
    ) -> Self {
        Self::Watch {
            operation,
            path: path.into(),
            source,
        }
    }
}

/// Retry classes for copy failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The file is open for exclusive access elsewhere; back off harder.
    Locked,
    /// Transient condition worth retrying at the base delay.
    Transient,
    /// Retrying cannot help; drop the candidate for this tick.
    Permanent,
}

/// Classify an IO error into a retry class.
///
/// Size-verification mismatches are surfaced as `InvalidData` and stay
/// retryable: the source may still have been settling when the copy was
/// dispatched.
#[must_use]
pub fn classify(err: &io::Error) -> FailureKind {
    match err.kind() {
        io::ErrorKind::PermissionDenied | io::ErrorKind::WouldBlock => FailureKind::Locked,
        io::ErrorKind::NotFound
        | io::ErrorKind::Interrupted
        | io::ErrorKind::TimedOut
        | io::ErrorKind::UnexpectedEof
        | io::ErrorKind::InvalidData => FailureKind::Transient,
        _ => FailureKind::Permanent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn error_helpers_preserve_sources() {
        let err = CoreError::io("read", "path", io::Error::other("io"));
        assert!(matches!(err, CoreError::Io { .. }));
        assert!(err.source().is_some());

        let watch = CoreError::watch(
            "watch",
            "root",
            notify::Error::generic("watcher unavailable"),
        );
        assert!(matches!(watch, CoreError::Watch { .. }));
        assert!(watch.source().is_some());
    }

    #[test]
    fn lock_class_failures_are_recognised() {
        let denied = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        assert_eq!(classify(&denied), FailureKind::Locked);
        let busy = io::Error::new(io::ErrorKind::WouldBlock, "busy");
        assert_eq!(classify(&busy), FailureKind::Locked);
    }

    #[test]
    fn vanished_and_short_reads_are_transient() {
        let missing = io::Error::new(io::ErrorKind::NotFound, "gone");
        assert_eq!(classify(&missing), FailureKind::Transient);
        let mismatch = io::Error::new(io::ErrorKind::InvalidData, "size mismatch");
        assert_eq!(classify(&mismatch), FailureKind::Transient);
    }

    #[test]
    fn unknown_failures_are_permanent() {
        let odd = io::Error::other("disk exploded");
        assert_eq!(classify(&odd), FailureKind::Permanent);
    }
}
