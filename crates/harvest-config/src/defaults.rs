//! Documented default values for the configuration document.

use std::path::PathBuf;

/// Directory name appended to the platform temp directory for the default
/// watch root, matching the staging directory used by WinGet-style
/// downloaders.
pub const WATCH_DIR_NAME: &str = "WinGet";

/// Directory name for the default target root under the user's home.
pub const TARGET_DIR_NAME: &str = "harvest";

/// Extensions harvested when the document does not specify a list.
pub const ALLOWED_EXTENSIONS: &[&str] = &["exe", "whl"];

/// Suffix marking a file that is still being written by the downloader.
pub const INCOMPLETE_SUFFIX: &str = ".tmp";

/// Seconds between steady-state scan passes.
pub const SCAN_INTERVAL_SECS: u64 = 5;

/// Seconds between sweep prompt checkpoints (20 minutes).
pub const SWEEP_PROMPT_INTERVAL_SECS: u64 = 20 * 60;

/// Copy attempts before a candidate is dropped for the tick.
pub const RETRY_MAX_ATTEMPTS: u32 = 3;

/// Base delay between copy attempts in milliseconds.
pub const RETRY_BASE_DELAY_MS: u64 = 500;

/// Milliseconds between stability size samples.
pub const STABILITY_SAMPLE_INTERVAL_MS: u64 = 1_000;

/// Consecutive identical size samples required to declare a file stable.
pub const STABILITY_REQUIRED_SAMPLES: u32 = 3;

/// Seconds allowed for a candidate to stabilise before it is dropped for
/// the tick.
pub const STABILITY_TIMEOUT_SECS: u64 = 60;

/// Default watch root: the downloader staging directory under the platform
/// temp directory.
#[must_use]
pub fn watch_root() -> PathBuf {
    std::env::temp_dir().join(WATCH_DIR_NAME)
}

/// Default target root: a harvest directory under the user's home, falling
/// back to the temp directory when no home is available.
#[must_use]
pub fn target_root() -> PathBuf {
    std::env::var_os("HOME").map_or_else(
        || std::env::temp_dir().join(TARGET_DIR_NAME),
        |home| PathBuf::from(home).join(TARGET_DIR_NAME),
    )
}
