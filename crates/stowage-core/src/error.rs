//! Manifest error types.

use thiserror::Error;

/// Errors raised while decoding or validating a manifest.
///
/// All variants are fatal and non-retryable: a malformed manifest cannot be
/// fixed by trying again.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// The manifest is not structurally valid JSON for the expected shape
    /// (missing field, non-string repository, non-string relocation value...).
    #[error("manifest parse error: {source}")]
    Malformed {
        /// Underlying decoder error, including line and column.
        #[source]
        source: serde_json::Error,
    },

    /// A repository URL is unusable.
    #[error("invalid repository '{url}': {reason}")]
    InvalidRepository {
        /// The offending URL.
        url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A dependency declaration has an unusable field.
    #[error("invalid dependency field '{field}' = '{value}': {reason}")]
    InvalidDependency {
        /// Field name as it appears in the manifest.
        field: &'static str,
        /// The rejected value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A relocation rule is unusable.
    #[error("invalid relocation '{pattern}' -> '{replacement}': {reason}")]
    InvalidRelocation {
        /// Pattern side of the rule.
        pattern: String,
        /// Replacement side of the rule.
        replacement: String,
        /// Why it was rejected.
        reason: String,
    },
}

impl From<serde_json::Error> for ManifestError {
    fn from(source: serde_json::Error) -> Self {
        Self::Malformed { source }
    }
}

/// Result type for manifest operations.
pub type ManifestResult<T> = Result<T, ManifestError>;
