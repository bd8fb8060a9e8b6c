//! Normalisation and validation of configuration documents.

use crate::error::{ConfigError, ConfigResult};
use crate::model::HarvestConfig;

/// Normalise and validate a parsed configuration document.
///
/// Extensions are lowercased, stripped of leading dots, and deduplicated
/// while preserving order. Intervals and counters must be positive, roots
/// must be absolute, and the incomplete marker must be non-empty.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidField`] describing the first offending
/// field.
pub fn normalize(mut config: HarvestConfig) -> ConfigResult<HarvestConfig> {
    config.filter.allowed_extensions = normalize_extensions(&config.filter.allowed_extensions);
    if config.filter.allowed_extensions.is_empty() {
        return Err(invalid("filter", "allowed_extensions", "empty", None));
    }
    if config.filter.incomplete_suffix.is_empty() {
        return Err(invalid("filter", "incomplete_suffix", "empty", None));
    }
    if !config.watch_root.is_absolute() {
        return Err(invalid(
            "paths",
            "watch_root",
            "not_absolute",
            Some(config.watch_root.display().to_string()),
        ));
    }
    if !config.target_root.is_absolute() {
        return Err(invalid(
            "paths",
            "target_root",
            "not_absolute",
            Some(config.target_root.display().to_string()),
        ));
    }
    ensure_positive_u64("schedule", "scan_interval_secs", config.scan_interval_secs)?;
    ensure_positive_u32("retry", "max_attempts", config.retry.max_attempts)?;
    ensure_positive_u64("retry", "base_delay_ms", config.retry.base_delay_ms)?;
    ensure_positive_u64(
        "stability",
        "sample_interval_ms",
        config.stability.sample_interval_ms,
    )?;
    ensure_positive_u32(
        "stability",
        "required_samples",
        config.stability.required_samples,
    )?;
    ensure_positive_u64("stability", "timeout_secs", config.stability.timeout_secs)?;
    Ok(config)
}

fn normalize_extensions(extensions: &[String]) -> Vec<String> {
    let mut seen = Vec::new();
    for extension in extensions {
        let cleaned = extension.trim().trim_start_matches('.').to_ascii_lowercase();
        if !cleaned.is_empty() && !seen.contains(&cleaned) {
            seen.push(cleaned);
        }
    }
    seen
}

const fn invalid(
    section: &'static str,
    field: &'static str,
    reason: &'static str,
    value: Option<String>,
) -> ConfigError {
    ConfigError::InvalidField {
        section,
        field,
        reason,
        value,
    }
}

fn ensure_positive_u64(
    section: &'static str,
    field: &'static str,
    value: u64,
) -> ConfigResult<()> {
    if value == 0 {
        return Err(invalid(section, field, "zero", Some(value.to_string())));
    }
    Ok(())
}

fn ensure_positive_u32(
    section: &'static str,
    field: &'static str,
    value: u32,
) -> ConfigResult<()> {
    if value == 0 {
        return Err(invalid(section, field, "zero", Some(value.to_string())));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FilterSettings, StabilitySettings};

    fn with_extensions(extensions: &[&str]) -> HarvestConfig {
        HarvestConfig {
            filter: FilterSettings {
                allowed_extensions: extensions.iter().map(ToString::to_string).collect(),
                ..FilterSettings::default()
            },
            ..HarvestConfig::default()
        }
    }

    #[test]
    fn defaults_validate_cleanly() {
        let config = normalize(HarvestConfig::default()).expect("defaults valid");
        assert_eq!(config.filter.allowed_extensions, vec!["exe", "whl"]);
    }

    #[test]
    fn extensions_are_lowercased_and_deduplicated() {
        let config = with_extensions(&[".EXE", "whl", "exe", "  "]);
        let config = normalize(config).expect("valid");
        assert_eq!(config.filter.allowed_extensions, vec!["exe", "whl"]);
    }

    #[test]
    fn empty_extension_list_is_rejected() {
        let err = normalize(with_extensions(&["."])).expect_err("must reject");
        assert!(matches!(
            err,
            ConfigError::InvalidField {
                field: "allowed_extensions",
                ..
            }
        ));
    }

    #[test]
    fn zero_intervals_are_rejected() {
        let config = HarvestConfig {
            stability: StabilitySettings {
                required_samples: 0,
                ..StabilitySettings::default()
            },
            ..HarvestConfig::default()
        };
        let err = normalize(config).expect_err("must reject");
        assert!(matches!(
            err,
            ConfigError::InvalidField {
                field: "required_samples",
                ..
            }
        ));
    }

    #[test]
    fn relative_roots_are_rejected() {
        let config = HarvestConfig {
            watch_root: "downloads".into(),
            ..HarvestConfig::default()
        };
        let err = normalize(config).expect_err("must reject");
        assert!(matches!(
            err,
            ConfigError::InvalidField {
                field: "watch_root",
                ..
            }
        ));
    }
}
