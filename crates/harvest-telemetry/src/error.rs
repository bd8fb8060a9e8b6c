//! Error types for telemetry initialisation.

use thiserror::Error;

/// Result alias for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// Errors produced while installing the tracing subscriber.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The global tracing subscriber could not be installed.
    #[error("failed to install tracing subscriber")]
    SubscriberInit {
        /// Underlying initialisation error.
        source: tracing_subscriber::util::TryInitError,
    },
}
