//! The loader configuration value.

use std::path::{Path, PathBuf};
use std::time::Duration;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use stowage_core::RelocationRules;

use crate::error::{ConfigError, ConfigResult};

/// Default manifest resource name inside a bootstrapped archive.
pub const DEFAULT_MANIFEST_RESOURCE: &str = "loader-manifest.json";

/// Default HTTP connect timeout in seconds.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default progress reporting interval in milliseconds.
pub const DEFAULT_PROGRESS_INTERVAL_MS: u64 = 500;

/// Everything the loader needs before resolution begins.
///
/// Built once, either in code through [`LoaderConfig::new`] and the
/// `with_*` methods, or from a TOML file through
/// [`load`](crate::loader::load). Never mutated after construction.
///
/// ```toml
/// cache_dir = "/var/cache/my-plugin/libs"
/// scratch_dir = "/var/cache/my-plugin/scratch"
/// prune = true
/// relocate = true
/// workers = 4
///
/// [relocations]
/// "com.google.gson" = "my.plugin.libs.gson"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoaderConfig {
    cache_dir: PathBuf,
    scratch_dir: PathBuf,
    prune: bool,
    relocate: bool,
    progress: bool,
    relocations: IndexMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    workers: Option<usize>,
    connect_timeout_secs: u64,
    progress_interval_ms: u64,
    manifest_resource: String,
}

impl Default for LoaderConfig {
    /// Default flags with unset directories. [`load`](crate::loader::load)
    /// fills unset directories from the platform cache location.
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::new(),
            scratch_dir: PathBuf::new(),
            prune: true,
            relocate: true,
            progress: true,
            relocations: IndexMap::new(),
            workers: None,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            progress_interval_ms: DEFAULT_PROGRESS_INTERVAL_MS,
            manifest_resource: DEFAULT_MANIFEST_RESOURCE.to_owned(),
        }
    }
}

impl LoaderConfig {
    /// Configuration with default flags for the given directories.
    #[must_use]
    pub fn new(cache_dir: impl Into<PathBuf>, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            scratch_dir: scratch_dir.into(),
            ..Self::default()
        }
    }

    /// Enable or disable pruning of stale cache files.
    #[must_use]
    pub fn with_prune(mut self, prune: bool) -> Self {
        self.prune = prune;
        self
    }

    /// Enable or disable relocation.
    #[must_use]
    pub fn with_relocate(mut self, relocate: bool) -> Self {
        self.relocate = relocate;
        self
    }

    /// Enable or disable progress logging.
    #[must_use]
    pub fn with_progress(mut self, progress: bool) -> Self {
        self.progress = progress;
        self
    }

    /// Add a relocation rule applied after the manifest's own rules.
    /// A pattern already configured keeps its first replacement.
    #[must_use]
    pub fn with_relocation(
        mut self,
        pattern: impl Into<String>,
        replacement: impl Into<String>,
    ) -> Self {
        self.relocations
            .entry(pattern.into())
            .or_insert_with(|| replacement.into());
        self
    }

    /// Fix the number of parallel resolver workers.
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    /// Set the HTTP connect timeout. Rounded down to whole seconds.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_secs = timeout.as_secs();
        self
    }

    /// Set the progress reporting interval. Rounded down to milliseconds.
    #[must_use]
    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the name of the manifest resource in a bootstrapped archive.
    #[must_use]
    pub fn with_manifest_resource(mut self, name: impl Into<String>) -> Self {
        self.manifest_resource = name.into();
        self
    }

    /// Cache root.
    #[must_use]
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Scratch directory for in-flight files.
    #[must_use]
    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    /// Whether stale cache files are pruned after resolution.
    #[must_use]
    pub fn prune(&self) -> bool {
        self.prune
    }

    /// Whether archives are relocated.
    #[must_use]
    pub fn relocate(&self) -> bool {
        self.relocate
    }

    /// Whether progress is logged.
    #[must_use]
    pub fn progress(&self) -> bool {
        self.progress
    }

    /// Configured worker count, if fixed.
    #[must_use]
    pub fn workers(&self) -> Option<usize> {
        self.workers
    }

    /// HTTP connect timeout.
    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Progress reporting interval.
    #[must_use]
    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    /// Manifest resource name.
    #[must_use]
    pub fn manifest_resource(&self) -> &str {
        &self.manifest_resource
    }

    /// Configured relocation rules as raw pairs, in declared order.
    pub fn relocation_pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.relocations
            .iter()
            .map(|(p, r)| (p.as_str(), r.as_str()))
    }

    /// Configured relocation rules.
    ///
    /// # Errors
    ///
    /// Returns a validation error naming the first invalid rule.
    pub fn relocation_rules(&self) -> ConfigResult<RelocationRules> {
        RelocationRules::from_pairs(self.relocation_pairs()).map_err(|e| {
            ConfigError::ValidationError {
                field: "relocations".to_owned(),
                message: e.to_string(),
            }
        })
    }

    pub(crate) fn has_directories(&self) -> bool {
        !self.cache_dir.as_os_str().is_empty() && !self.scratch_dir.as_os_str().is_empty()
    }

    pub(crate) fn fill_directories(&mut self, cache_dir: PathBuf, scratch_dir: PathBuf) {
        if self.cache_dir.as_os_str().is_empty() {
            self.cache_dir = cache_dir;
        }
        if self.scratch_dir.as_os_str().is_empty() {
            self.scratch_dir = scratch_dir;
        }
    }
}
