//! The loader facade: prepare dependencies, then build isolated scopes.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use stowage_config::LoaderConfig;
use stowage_core::{Manifest, RelocationRules};
use stowage_resolver::{ResolvedSet, Resolver, ResolverOptions};
use tracing::info;

use crate::error::{LoaderError, LoaderResult};
use crate::scope::{ArchiveScope, IsolatedScope, Scope};

/// Build resolver options from a loader configuration.
///
/// # Errors
///
/// Returns a configuration error if the configured relocation rules are
/// invalid.
pub fn resolver_options(config: &LoaderConfig) -> LoaderResult<ResolverOptions> {
    let mut options = ResolverOptions::new(config.scratch_dir());
    options.relocate = config.relocate();
    options.extra_rules = config.relocation_rules()?;
    options.prune = config.prune();
    options.progress = config.progress();
    options.progress_interval = config.progress_interval();
    options.workers = config.workers();
    options.connect_timeout = config.connect_timeout();
    Ok(options)
}

/// Turns a manifest into a verified, relocated set of archives and composes
/// them into isolated scopes.
///
/// # Example
///
/// ```rust,ignore
/// let config = LoaderConfig::new(cache_dir, scratch_dir);
/// let mut loader = Loader::new(config, Manifest::parse(&json)?)?;
/// loader.prepare().await?;
/// let scope = loader.create_isolated_scope(Arc::new(EmptyScope), &[plugin_jar])?;
/// ```
#[derive(Debug)]
pub struct Loader {
    config: LoaderConfig,
    manifest: Manifest,
    resolver: Resolver,
    resolved: Option<ResolvedSet>,
}

impl Loader {
    /// Validate `config` and create a loader for `manifest`. Clears the
    /// scratch directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the scratch
    /// directory cannot be prepared.
    pub fn new(config: LoaderConfig, manifest: Manifest) -> LoaderResult<Self> {
        config.validate()?;
        let resolver = Resolver::new(resolver_options(&config)?)?;
        Ok(Self {
            config,
            manifest,
            resolver,
            resolved: None,
        })
    }

    /// Like [`Loader::new`], decoding the manifest from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the manifest is malformed or the configuration is
    /// invalid.
    pub fn from_json(config: LoaderConfig, manifest_json: &[u8]) -> LoaderResult<Self> {
        Self::new(config, Manifest::from_slice(manifest_json)?)
    }

    /// The configuration in use.
    #[must_use]
    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// The manifest being loaded.
    #[must_use]
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Relocation rules applied to every archive this loader produces.
    #[must_use]
    pub fn effective_rules(&self) -> RelocationRules {
        self.resolver.effective_rules(&self.manifest)
    }

    /// Resolve every dependency into the cache and remember the result.
    ///
    /// Every call redoes the full verification pass; a warm cache makes
    /// that a local hash check per dependency.
    ///
    /// # Errors
    ///
    /// Returns the resolver's error if any dependency cannot be resolved.
    /// A failed call leaves no resolved set behind.
    pub async fn prepare(&mut self) -> LoaderResult<&ResolvedSet> {
        self.resolved = None;
        let resolved = self
            .resolver
            .resolve(&self.manifest, self.config.cache_dir())
            .await?;
        info!(dependencies = resolved.len(), "Loader prepared");
        Ok(self.resolved.insert(resolved))
    }

    /// Forget the resolved set.
    pub fn reset(&mut self) {
        self.resolved = None;
    }

    /// The resolved set from the last successful [`prepare`](Self::prepare).
    #[must_use]
    pub fn resolved(&self) -> Option<&ResolvedSet> {
        self.resolved.as_ref()
    }

    /// Compose `extra_archives` and every resolved archive into a
    /// child-first scope over `parent`.
    ///
    /// Lookup order is `extra_archives` as given, then resolved archives in
    /// manifest order, then `parent`.
    ///
    /// # Errors
    ///
    /// Returns [`LoaderError::NotPrepared`] before a successful
    /// [`prepare`](Self::prepare), or an error if an archive cannot be read.
    pub fn create_isolated_scope(
        &self,
        parent: Arc<dyn Scope>,
        extra_archives: &[PathBuf],
    ) -> LoaderResult<IsolatedScope> {
        let resolved = self.resolved.as_ref().ok_or(LoaderError::NotPrepared)?;
        let archives = extra_archives
            .iter()
            .map(PathBuf::as_path)
            .chain(resolved.iter().map(|r| r.archive()));
        let local = ArchiveScope::open(archives)?;
        info!(archives = local.archives().len(), "Created isolated scope");
        Ok(IsolatedScope::new(local, parent))
    }

    /// The cache root.
    #[must_use]
    pub fn cache_dir(&self) -> &Path {
        self.config.cache_dir()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::EmptyScope;

    #[test]
    fn options_follow_config() {
        let config = LoaderConfig::new("/c", "/s")
            .with_prune(false)
            .with_relocate(false)
            .with_workers(2)
            .with_relocation("a.b", "x.y");
        let options = resolver_options(&config).unwrap();
        assert!(!options.prune);
        assert!(!options.relocate);
        assert_eq!(options.workers, Some(2));
        assert_eq!(options.extra_rules.len(), 1);
        assert_eq!(options.scratch_dir, Path::new("/s"));
    }

    #[test]
    fn scope_requires_prepare() {
        let tmp = tempfile::tempdir().unwrap();
        let config = LoaderConfig::new(tmp.path().join("cache"), tmp.path().join("scratch"));
        let loader = Loader::from_json(
            config,
            br#"{"repositories": [], "dependencies": []}"#,
        )
        .unwrap();

        assert!(loader.resolved().is_none());
        assert!(matches!(
            loader.create_isolated_scope(Arc::new(EmptyScope), &[]),
            Err(LoaderError::NotPrepared)
        ));
    }

    #[test]
    fn invalid_config_rejected() {
        let manifest = Manifest::parse(r#"{"repositories": [], "dependencies": []}"#).unwrap();
        let config = LoaderConfig::new("/same", "/same");
        assert!(matches!(
            Loader::new(config, manifest),
            Err(LoaderError::Config(_))
        ));
    }
}
