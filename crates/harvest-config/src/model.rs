//! Typed configuration document and sections.
//!
//! # Design
//! - Pure data carriers used by the loader and the pipeline.
//! - Every field carries a serde default so partial documents parse.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::defaults;

/// Top-level configuration document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct HarvestConfig {
    /// Directory tree observed for finished downloads.
    pub watch_root: PathBuf,
    /// Destination directory for harvested artifacts.
    pub target_root: PathBuf,
    /// Preserve source-relative paths under the target root instead of
    /// flattening copies to direct children named by file name.
    pub mirror_tree: bool,
    /// Candidate discovery strategy.
    pub scanner: ScannerStrategy,
    /// Seconds between steady-state scan passes.
    pub scan_interval_secs: u64,
    /// Seconds between sweep prompt checkpoints.
    pub sweep_prompt_interval_secs: u64,
    /// Candidate qualification settings.
    pub filter: FilterSettings,
    /// Copy retry settings.
    pub retry: RetrySettings,
    /// File-completion heuristic settings.
    pub stability: StabilitySettings,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            watch_root: defaults::watch_root(),
            target_root: defaults::target_root(),
            mirror_tree: false,
            scanner: ScannerStrategy::default(),
            scan_interval_secs: defaults::SCAN_INTERVAL_SECS,
            sweep_prompt_interval_secs: defaults::SWEEP_PROMPT_INTERVAL_SECS,
            filter: FilterSettings::default(),
            retry: RetrySettings::default(),
            stability: StabilitySettings::default(),
        }
    }
}

impl HarvestConfig {
    /// Interval between steady-state scan passes.
    #[must_use]
    pub const fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs)
    }

    /// Interval between sweep prompt checkpoints.
    #[must_use]
    pub const fn sweep_prompt_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_prompt_interval_secs)
    }
}

/// Candidate discovery strategy.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ScannerStrategy {
    /// Walk the watch root on every tick.
    #[default]
    Poll,
    /// Subscribe to filesystem change events and drain them each tick.
    Watch,
}

/// Candidate qualification settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct FilterSettings {
    /// Allow-listed extensions, matched case-insensitively without dots.
    pub allowed_extensions: Vec<String>,
    /// File-name suffix marking an incomplete download.
    pub incomplete_suffix: String,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            allowed_extensions: defaults::ALLOWED_EXTENSIONS
                .iter()
                .map(ToString::to_string)
                .collect(),
            incomplete_suffix: defaults::INCOMPLETE_SUFFIX.to_string(),
        }
    }
}

/// Copy retry settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetrySettings {
    /// Copy attempts before the candidate is dropped for the tick.
    pub max_attempts: u32,
    /// Base delay between attempts in milliseconds; lock-class failures
    /// double it per attempt.
    pub base_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: defaults::RETRY_MAX_ATTEMPTS,
            base_delay_ms: defaults::RETRY_BASE_DELAY_MS,
        }
    }
}

impl RetrySettings {
    /// Base delay between attempts.
    #[must_use]
    pub const fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }
}

/// File-completion heuristic settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StabilitySettings {
    /// Milliseconds between size samples.
    pub sample_interval_ms: u64,
    /// Consecutive identical samples required to declare stability.
    pub required_samples: u32,
    /// Seconds allowed for a candidate to stabilise.
    pub timeout_secs: u64,
}

impl Default for StabilitySettings {
    fn default() -> Self {
        Self {
            sample_interval_ms: defaults::STABILITY_SAMPLE_INTERVAL_MS,
            required_samples: defaults::STABILITY_REQUIRED_SAMPLES,
            timeout_secs: defaults::STABILITY_TIMEOUT_SECS,
        }
    }
}

impl StabilitySettings {
    /// Interval between size samples.
    #[must_use]
    pub const fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    /// Overall stabilisation deadline.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
