//! Candidate qualification predicate.

use std::ffi::OsStr;
use std::path::Path;

use harvest_config::FilterSettings;

/// Pure predicate deciding whether a path is a monitorable artifact.
///
/// A path qualifies iff it names a regular file (symlinks are followed),
/// its size is strictly positive at the time of the check, its name does
/// not end with the incomplete marker, and its extension is on the
/// allow-list (case-insensitive). Re-evaluated on every scan tick because
/// size and existence change between ticks.
#[derive(Debug, Clone)]
pub struct PathFilter {
    allowed_extensions: Vec<String>,
    incomplete_suffix: String,
}

impl PathFilter {
    /// Build a filter from configuration; extensions are stored lowercased
    /// without leading dots.
    #[must_use]
    pub fn new(settings: &FilterSettings) -> Self {
        Self {
            allowed_extensions: settings
                .allowed_extensions
                .iter()
                .map(|extension| extension.trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            incomplete_suffix: settings.incomplete_suffix.clone(),
        }
    }

    /// Whether the path qualifies as a copyable artifact right now.
    #[must_use]
    pub fn qualifies(&self, path: &Path) -> bool {
        let Ok(metadata) = path.metadata() else {
            return false;
        };
        if !metadata.is_file() || metadata.len() == 0 {
            return false;
        }
        let Some(name) = path.file_name().and_then(OsStr::to_str) else {
            return false;
        };
        if name.ends_with(&self.incomplete_suffix) {
            return false;
        }
        path.extension()
            .and_then(OsStr::to_str)
            .is_some_and(|extension| {
                self.allowed_extensions
                    .iter()
                    .any(|allowed| allowed.eq_ignore_ascii_case(extension))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn filter() -> PathFilter {
        PathFilter::new(&FilterSettings::default())
    }

    #[test]
    fn accepts_non_empty_allowed_file() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("installer.exe");
        fs::write(&path, b"payload")?;
        assert!(filter().qualifies(&path));
        Ok(())
    }

    #[test]
    fn extension_match_is_case_insensitive() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("Installer.EXE");
        fs::write(&path, b"payload")?;
        assert!(filter().qualifies(&path));
        Ok(())
    }

    #[test]
    fn rejects_zero_size_files() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("empty.exe");
        fs::write(&path, b"")?;
        assert!(!filter().qualifies(&path));
        Ok(())
    }

    #[test]
    fn rejects_incomplete_marker_suffix() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        // The marker wins even when the final extension is allow-listed.
        let path = temp.path().join("installer.exe.tmp");
        fs::write(&path, b"partial")?;
        assert!(!filter().qualifies(&path));
        Ok(())
    }

    #[test]
    fn rejects_unlisted_extensions_and_directories() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("notes.txt");
        fs::write(&path, b"text")?;
        assert!(!filter().qualifies(&path));
        assert!(!filter().qualifies(temp.path()));
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn follows_symlinks_to_regular_files() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let target = temp.path().join("installer.exe");
        fs::write(&target, b"payload")?;
        let link = temp.path().join("link.exe");
        std::os::unix::fs::symlink(&target, &link)?;
        assert!(filter().qualifies(&link));
        Ok(())
    }

    #[test]
    fn rejects_missing_files() {
        assert!(!filter().qualifies(Path::new("/definitely/missing/file.exe")));
    }
}
