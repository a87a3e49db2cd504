//! Resolver error types.

use std::fmt::Write as _;
use std::path::PathBuf;

use stowage_relocator::RelocationError;
use thiserror::Error;

/// Errors from resolving dependencies.
///
/// Errors raised while trying one repository are either *soft* (recorded,
/// then the next repository is tried) or *hard* (the dependency fails at
/// once). See [`ResolveError::is_retryable`].
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The repository publishes a different hash than the manifest declares.
    #[error("repository {repository} publishes sha1 {published} for {dependency}, expected {expected}")]
    RepositoryHashMismatch {
        /// Repository base URL.
        repository: String,
        /// Dependency coordinates.
        dependency: String,
        /// Hash declared in the manifest.
        expected: String,
        /// Hash the repository published.
        published: String,
    },

    /// Downloaded bytes do not hash to what the repository published.
    #[error("download of {url} hashed to {actual}, repository published {expected}")]
    TransferIntegrity {
        /// Artifact URL.
        url: String,
        /// Hash the repository published.
        expected: String,
        /// Hash of the received bytes.
        actual: String,
    },

    /// The request could not be completed.
    #[error("request to {url} failed: {source}")]
    Transport {
        /// Requested URL.
        url: String,
        /// Underlying error.
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-success status.
    #[error("request to {url} returned HTTP {status}")]
    HttpStatus {
        /// Requested URL.
        url: String,
        /// Response status code.
        status: u16,
    },

    /// A `.sha1` file had no digest in it.
    #[error("sha1 file at {url} is empty")]
    EmptySidecar {
        /// Sidecar URL.
        url: String,
    },

    /// Local file system failure.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File or directory involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Relocating a verified download failed.
    #[error("failed to relocate {dependency}: {source}")]
    Relocation {
        /// Dependency coordinates.
        dependency: String,
        /// Underlying error.
        #[source]
        source: RelocationError,
    },

    /// A dependency could not be resolved. Lists every repository tried and
    /// why it failed, in the order they were tried.
    #[error("could not resolve {dependency}: {}", format_attempts(.attempts))]
    Unresolved {
        /// Dependency coordinates.
        dependency: String,
        /// One entry per repository tried.
        attempts: Vec<RepositoryAttempt>,
    },

    /// More than one dependency failed.
    #[error("{} dependencies failed to resolve:{}", .errors.len(), format_errors(.errors))]
    Multiple {
        /// One error per failed dependency.
        errors: Vec<ResolveError>,
    },

    /// The HTTP client could not be built.
    #[error("failed to build HTTP client: {message}")]
    Client {
        /// Failure reason.
        message: String,
    },

    /// A worker task panicked or was cancelled.
    #[error("resolver task failed: {message}")]
    TaskFailed {
        /// Failure reason.
        message: String,
    },
}

/// One failed attempt against one repository.
#[derive(Debug)]
pub struct RepositoryAttempt {
    /// Repository base URL.
    pub repository: String,
    /// Why the attempt failed.
    pub error: ResolveError,
}

impl ResolveError {
    /// Whether the next repository should be tried after this error.
    ///
    /// Network, integrity and local I/O failures are soft. Relocation
    /// failures are hard: the bytes were already verified, so another
    /// repository would serve the same archive.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RepositoryHashMismatch { .. }
                | Self::TransferIntegrity { .. }
                | Self::Transport { .. }
                | Self::HttpStatus { .. }
                | Self::EmptySidecar { .. }
                | Self::Io { .. }
        )
    }

    /// Every per-dependency error, flattening [`ResolveError::Multiple`].
    #[must_use]
    pub fn failures(&self) -> Vec<&ResolveError> {
        match self {
            Self::Multiple { errors } => errors.iter().flat_map(Self::failures).collect(),
            other => vec![other],
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

fn format_attempts(attempts: &[RepositoryAttempt]) -> String {
    if attempts.is_empty() {
        return "no repositories configured".to_string();
    }
    let mut out = String::new();
    for (i, attempt) in attempts.iter().enumerate() {
        if i > 0 {
            out.push_str("; ");
        }
        let _ = write!(out, "[{}] {}", attempt.repository, attempt.error);
    }
    out
}

fn format_errors(errors: &[ResolveError]) -> String {
    let mut out = String::new();
    for error in errors {
        let _ = write!(out, "\n  - {error}");
    }
    out
}

/// Result type for resolver operations.
pub type ResolveResult<T> = Result<T, ResolveError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unresolved_lists_every_repository() {
        let err = ResolveError::Unresolved {
            dependency: "g:a:1".into(),
            attempts: vec![
                RepositoryAttempt {
                    repository: "https://one".into(),
                    error: ResolveError::HttpStatus {
                        url: "https://one/g/a/1/a-1.jar.sha1".into(),
                        status: 404,
                    },
                },
                RepositoryAttempt {
                    repository: "https://two".into(),
                    error: ResolveError::RepositoryHashMismatch {
                        repository: "https://two".into(),
                        dependency: "g:a:1".into(),
                        expected: "aa".into(),
                        published: "bb".into(),
                    },
                },
            ],
        };
        let message = err.to_string();
        assert!(message.contains("g:a:1"));
        assert!(message.contains("[https://one]"));
        assert!(message.contains("HTTP 404"));
        assert!(message.contains("[https://two]"));
        assert!(message.contains("publishes sha1 bb"));
    }

    #[test]
    fn no_repositories_message() {
        let err = ResolveError::Unresolved {
            dependency: "g:a:1".into(),
            attempts: Vec::new(),
        };
        assert!(err.to_string().contains("no repositories configured"));
    }

    #[test]
    fn retry_classification() {
        assert!(
            ResolveError::HttpStatus {
                url: String::new(),
                status: 500
            }
            .is_retryable()
        );
        assert!(
            !ResolveError::Relocation {
                dependency: String::new(),
                source: RelocationError::AlreadyRun,
            }
            .is_retryable()
        );
        assert!(
            !ResolveError::Unresolved {
                dependency: String::new(),
                attempts: Vec::new(),
            }
            .is_retryable()
        );
    }

    #[test]
    fn failures_flatten() {
        let err = ResolveError::Multiple {
            errors: vec![
                ResolveError::TaskFailed {
                    message: "one".into(),
                },
                ResolveError::TaskFailed {
                    message: "two".into(),
                },
            ],
        };
        assert_eq!(err.failures().len(), 2);
        assert!(err.to_string().starts_with("2 dependencies failed"));
    }
}
