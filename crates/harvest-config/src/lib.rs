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

//! File-backed configuration for the harvest pipeline.
//!
//! Layout: `model.rs` (typed config document and sections), `defaults.rs`
//! (documented default values), `validate.rs` (normalisation and validation),
//! `loader.rs` (load-or-initialise against the persisted JSON document).
//!
//! Missing configuration never prevents startup: an absent document is
//! created from defaults and used; a malformed document is logged and
//! substituted with defaults without touching the file on disk.

pub mod defaults;
pub mod error;
pub mod loader;
pub mod model;
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::{CONFIG_ENV, config_path, load_or_init, persist};
pub use model::{
    FilterSettings, HarvestConfig, RetrySettings, ScannerStrategy, StabilitySettings,
};
pub use validate::normalize;
