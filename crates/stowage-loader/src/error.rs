//! Loader error types.

use std::path::PathBuf;

use stowage_config::ConfigError;
use stowage_core::ManifestError;
use stowage_relocator::RelocationError;
use stowage_resolver::ResolveError;
use stowage_telemetry::TelemetryError;
use thiserror::Error;

use crate::bootstrap::LifecycleState;

/// Error type returned by host-supplied lifecycle code.
pub type HostError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors from the loader facade and bootstrap.
#[derive(Debug, Error)]
pub enum LoaderError {
    /// The configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The manifest could not be decoded.
    #[error("invalid manifest: {0}")]
    Manifest(#[from] ManifestError),

    /// The bootstrapped archive carries no manifest resource.
    #[error("archive {archive} has no manifest entry {resource}")]
    MissingManifest {
        /// Archive searched.
        archive: PathBuf,
        /// Entry name looked up.
        resource: String,
    },

    /// Dependency resolution failed.
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// Relocating the bootstrapped archive failed.
    #[error("failed to relocate {archive}: {source}")]
    Relocation {
        /// Archive being relocated.
        archive: PathBuf,
        /// Underlying error.
        #[source]
        source: RelocationError,
    },

    /// An archive in a scope could not be read.
    #[error("archive error on {path}: {source}")]
    Archive {
        /// Archive involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: zip::result::ZipError,
    },

    /// Local file system failure.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// An isolated scope was requested before [`prepare`](crate::Loader::prepare)
    /// succeeded.
    #[error("dependencies have not been prepared")]
    NotPrepared,

    /// Host code failed during a lifecycle phase.
    #[error("{phase} failed: {source}")]
    Lifecycle {
        /// Phase that failed.
        phase: &'static str,
        /// Error raised by host code.
        #[source]
        source: HostError,
    },

    /// A lifecycle operation was called in the wrong state.
    #[error("cannot {operation} while {state}")]
    InvalidState {
        /// Operation attempted.
        operation: &'static str,
        /// State at the time.
        state: LifecycleState,
    },

    /// Logging could not be set up.
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),

    /// A blocking task panicked.
    #[error("loader task failed: {message}")]
    TaskFailed {
        /// Failure reason.
        message: String,
    },
}

impl LoaderError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn archive(path: impl Into<PathBuf>, source: zip::result::ZipError) -> Self {
        Self::Archive {
            path: path.into(),
            source,
        }
    }
}

/// Result type for loader operations.
pub type LoaderResult<T> = Result<T, LoaderError>;
