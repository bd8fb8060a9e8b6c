//! Load-or-initialise against the persisted JSON document.
//!
//! # Design
//! - An absent document is created from defaults and used.
//! - A malformed or invalid document is logged and substituted with defaults
//!   without touching the file on disk, so the operator can repair it.
//! - Loading never fails: the pipeline must not refuse to start over
//!   configuration.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{ConfigError, ConfigResult};
use crate::model::HarvestConfig;
use crate::validate::normalize;

/// Environment variable overriding the configuration document path.
pub const CONFIG_ENV: &str = "HARVEST_CONFIG";

/// Resolve the configuration document path.
///
/// `HARVEST_CONFIG` wins when set; otherwise the document lives under
/// `$HOME/.config/harvest/config.json`, falling back to the temp directory
/// when no home is available.
#[must_use]
pub fn config_path() -> PathBuf {
    std::env::var_os(CONFIG_ENV).map_or_else(default_config_path, PathBuf::from)
}

fn default_config_path() -> PathBuf {
    std::env::var_os("HOME").map_or_else(
        || std::env::temp_dir().join("harvest").join("config.json"),
        |home| {
            PathBuf::from(home)
                .join(".config")
                .join("harvest")
                .join("config.json")
        },
    )
}

/// Load the configuration document, initialising it from defaults when
/// absent. Never fails; every recovery path is logged.
#[must_use]
pub fn load_or_init(path: &Path) -> HarvestConfig {
    match fs::read_to_string(path) {
        Ok(text) => parse_document(path, &text),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => initialise(path),
        Err(err) => {
            warn!(
                path = %path.display(),
                error = %err,
                "failed to read configuration document, using defaults"
            );
            HarvestConfig::default()
        }
    }
}

fn parse_document(path: &Path, text: &str) -> HarvestConfig {
    match serde_json::from_str::<HarvestConfig>(text) {
        Ok(parsed) => match normalize(parsed) {
            Ok(config) => {
                info!(path = %path.display(), "configuration loaded");
                config
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "configuration document invalid, using defaults"
                );
                HarvestConfig::default()
            }
        },
        Err(err) => {
            warn!(
                path = %path.display(),
                error = %err,
                "configuration document malformed, using defaults"
            );
            HarvestConfig::default()
        }
    }
}

fn initialise(path: &Path) -> HarvestConfig {
    let config = HarvestConfig::default();
    match persist(path, &config) {
        Ok(()) => info!(path = %path.display(), "default configuration written"),
        Err(err) => warn!(
            path = %path.display(),
            error = %err,
            "failed to persist default configuration, continuing with defaults"
        ),
    }
    config
}

/// Write the configuration document to disk, creating parent directories.
///
/// # Errors
///
/// Returns an error when the parent directories cannot be created or the
/// document cannot be serialised or written.
pub fn persist(path: &Path, config: &HarvestConfig) -> ConfigResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|err| ConfigError::io("config.create_parent", parent, err))?;
    }
    let text = serde_json::to_string_pretty(config)
        .map_err(|err| ConfigError::document("config.serialize", path, err))?;
    fs::write(path, text).map_err(|err| ConfigError::io("config.write", path, err))?;
    Ok(())
}
