//! Non-blocking probe for files opened exclusively elsewhere.

use std::fs::OpenOptions;
use std::path::Path;

use fs2::FileExt;

/// Fast pre-check for files still held open by the downloader.
///
/// Attempts a non-blocking exclusive advisory lock; any failure to open or
/// lock reports "locked" rather than an error. False negatives are expected
/// (a writer need not hold an OS lock), which is why the completion waiter
/// remains the authoritative gate.
#[derive(Debug, Clone, Copy, Default)]
pub struct LockProbe;

impl LockProbe {
    /// Construct a probe.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Whether the file appears to be open for exclusive write elsewhere.
    #[must_use]
    pub fn is_locked(&self, path: &Path) -> bool {
        let Ok(file) = OpenOptions::new().read(true).open(path) else {
            return true;
        };
        // The advisory lock is released when the handle drops.
        file.try_lock_exclusive().is_err()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn unlocked_file_reports_unlocked() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("artifact.exe");
        fs::write(&path, b"payload")?;
        assert!(!LockProbe::new().is_locked(&path));
        Ok(())
    }

    #[test]
    fn exclusively_locked_file_reports_locked() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("artifact.exe");
        fs::write(&path, b"payload")?;

        let holder = fs::File::open(&path)?;
        holder.lock_exclusive()?;
        assert!(LockProbe::new().is_locked(&path));

        drop(holder);
        assert!(!LockProbe::new().is_locked(&path));
        Ok(())
    }

    #[test]
    fn missing_file_reports_locked() {
        assert!(LockProbe::new().is_locked(Path::new("/definitely/missing/file.exe")));
    }
}
