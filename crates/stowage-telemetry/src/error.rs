//! Telemetry error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while setting up logging.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The log configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// What is wrong.
        message: String,
    },

    /// A global subscriber could not be installed.
    #[error("Initialization error: {message}")]
    Init {
        /// Why installation failed.
        message: String,
    },

    /// The log directory could not be prepared.
    #[error("IO error on {path}: {source}")]
    Io {
        /// Log directory.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
