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

//! Application crate: wires configuration, telemetry, the event bus, and
//! the harvest loop into a runnable binary.

mod bootstrap;
mod error;
mod prompt;

pub use bootstrap::run_app;
pub use error::{AppError, AppResult};
pub use prompt::StdinSweepPrompt;
