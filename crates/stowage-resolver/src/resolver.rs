//! The dependency resolver.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use stowage_core::hash::{parse_sha1_sidecar, sha1_file};
use stowage_core::{CacheSlot, Dependency, Manifest, RelocationRules};
use stowage_relocator::JarRelocator;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::{self, PruneStats};
use crate::error::{RepositoryAttempt, ResolveError, ResolveResult};
use crate::progress::{DEFAULT_PROGRESS_INTERVAL, ProgressNotifier};
use crate::transport::{DEFAULT_CONNECT_TIMEOUT, HttpTransport};

/// Resolver settings.
#[derive(Debug, Clone)]
pub struct ResolverOptions {
    /// Directory for in-flight downloads. Cleared when the resolver is
    /// created.
    pub scratch_dir: PathBuf,
    /// Apply relocation rules. When off, archives are stored verbatim.
    pub relocate: bool,
    /// Rules appended to the manifest's for patterns it does not declare.
    pub extra_rules: RelocationRules,
    /// Delete cache files outside the resolved set after success.
    pub prune: bool,
    /// Emit periodic progress lines.
    pub progress: bool,
    /// Progress interval.
    pub progress_interval: Duration,
    /// Parallel dependency workers; `None` picks half the available cores.
    pub workers: Option<usize>,
    /// HTTP connect timeout.
    pub connect_timeout: Duration,
}

impl ResolverOptions {
    /// Options with defaults and the given scratch directory.
    #[must_use]
    pub fn new(scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            scratch_dir: scratch_dir.into(),
            relocate: true,
            extra_rules: RelocationRules::new(),
            prune: true,
            progress: true,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            workers: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Worker count actually used.
    #[must_use]
    pub fn effective_workers(&self) -> usize {
        self.workers.filter(|&w| w > 0).unwrap_or_else(default_workers)
    }
}

/// Half the available hardware parallelism, at least one.
#[must_use]
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get() / 2)
        .unwrap_or(1)
        .max(1)
}

/// A dependency whose archive is present in the cache and matches its
/// sidecar.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolvedDependency {
    dependency: Dependency,
    slot: CacheSlot,
}

impl ResolvedDependency {
    /// The declared dependency.
    #[must_use]
    pub fn dependency(&self) -> &Dependency {
        &self.dependency
    }

    /// Path of the verified, relocated archive.
    #[must_use]
    pub fn archive(&self) -> &Path {
        &self.slot.archive
    }

    /// Path of the archive's sidecar.
    #[must_use]
    pub fn sidecar(&self) -> &Path {
        &self.slot.sidecar
    }
}

/// One resolved entry per manifest dependency, in manifest order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedSet {
    entries: Vec<ResolvedDependency>,
}

impl ResolvedSet {
    /// Number of resolved dependencies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing was resolved.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate in manifest order.
    pub fn iter(&self) -> impl Iterator<Item = &ResolvedDependency> {
        self.entries.iter()
    }

    /// Look up the entry for `dependency`.
    #[must_use]
    pub fn get(&self, dependency: &Dependency) -> Option<&ResolvedDependency> {
        self.entries.iter().find(|r| &r.dependency == dependency)
    }

    /// Archive paths in manifest order.
    #[must_use]
    pub fn archive_paths(&self) -> Vec<PathBuf> {
        self.entries.iter().map(|r| r.slot.archive.clone()).collect()
    }

    /// Every file that belongs to this set: archives and their sidecars.
    #[must_use]
    pub fn whitelist(&self) -> HashSet<PathBuf> {
        self.entries
            .iter()
            .flat_map(|r| [r.slot.archive.clone(), r.slot.sidecar.clone()])
            .collect()
    }
}

impl<'a> IntoIterator for &'a ResolvedSet {
    type Item = &'a ResolvedDependency;
    type IntoIter = std::slice::Iter<'a, ResolvedDependency>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// State shared by every task of one resolve pass.
struct Pass {
    transport: HttpTransport,
    repositories: Vec<String>,
    rules: RelocationRules,
    scratch_dir: PathBuf,
}

/// Turns a manifest into verified, relocated archives in a cache root.
///
/// # Example
///
/// ```rust,ignore
/// let resolver = Resolver::new(ResolverOptions::new("/tmp/stowage-scratch"))?;
/// let manifest = Manifest::parse(&json)?;
/// let resolved = resolver.resolve(&manifest, Path::new("/var/cache/stowage")).await?;
/// for entry in &resolved {
///     println!("{} -> {}", entry.dependency(), entry.archive().display());
/// }
/// ```
#[derive(Debug)]
pub struct Resolver {
    options: ResolverOptions,
    transport: HttpTransport,
}

impl Resolver {
    /// Create a resolver and clear its scratch directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the scratch directory cannot be cleared or the
    /// HTTP client cannot be built.
    pub fn new(options: ResolverOptions) -> ResolveResult<Self> {
        cache::clear_directory(&options.scratch_dir)?;
        let transport = HttpTransport::new(options.connect_timeout)?;
        Ok(Self { options, transport })
    }

    /// The settings in use.
    #[must_use]
    pub fn options(&self) -> &ResolverOptions {
        &self.options
    }

    /// Rules applied to `manifest`'s dependencies: the manifest's own,
    /// then extra rules for patterns it does not declare. Empty when
    /// relocation is off.
    #[must_use]
    pub fn effective_rules(&self, manifest: &Manifest) -> RelocationRules {
        if !self.options.relocate {
            return RelocationRules::new();
        }
        let mut rules = manifest.relocations().clone();
        rules.extend_missing(&self.options.extra_rules);
        rules
    }

    /// Resolve every dependency of `manifest` into `cache_root`.
    ///
    /// Dependencies are resolved in parallel. The call returns only after
    /// every task has finished; if any dependency failed, the call fails and
    /// the other results are discarded. With pruning on, files under
    /// `cache_root` outside the resolved set are deleted after success.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::Unresolved`] for a single failed dependency,
    /// or [`ResolveError::Multiple`] when several failed.
    pub async fn resolve(&self, manifest: &Manifest, cache_root: &Path) -> ResolveResult<ResolvedSet> {
        let rules = self.effective_rules(manifest);
        let slots = manifest.cache_slots(cache_root, &rules);
        let total = slots.len();
        let workers = self.options.effective_workers();
        info!(
            dependencies = total,
            repositories = manifest.repositories().len(),
            workers,
            rules = rules.len(),
            "Resolving dependencies"
        );

        let pass = Arc::new(Pass {
            transport: self.transport.clone(),
            repositories: manifest.repositories().map(String::from).collect(),
            rules,
            scratch_dir: self.options.scratch_dir.clone(),
        });

        let completed = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();
        // Cancels the progress task on every exit path, including panics.
        let _cancel_guard = cancel.clone().drop_guard();
        let progress = self.options.progress.then(|| {
            ProgressNotifier::new(total, Arc::clone(&completed), self.options.progress_interval)
                .spawn(cancel.clone())
        });

        let semaphore = Arc::new(Semaphore::new(workers));
        let mut tasks = JoinSet::new();
        for (position, (dependency, slot)) in slots.into_iter().enumerate() {
            let pass = Arc::clone(&pass);
            let semaphore = Arc::clone(&semaphore);
            let completed = Arc::clone(&completed);
            tasks.spawn(async move {
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) => resolve_one(&pass, dependency, slot).await,
                    Err(e) => Err(ResolveError::TaskFailed {
                        message: e.to_string(),
                    }),
                };
                completed.fetch_add(1, Ordering::Relaxed);
                (position, result)
            });
        }

        let mut resolved: Vec<Option<ResolvedDependency>> = vec![None; total];
        let mut errors = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((position, Ok(entry))) => {
                    if let Some(slot) = resolved.get_mut(position) {
                        *slot = Some(entry);
                    }
                },
                Ok((_, Err(error))) => errors.push(error),
                Err(join_error) => errors.push(ResolveError::TaskFailed {
                    message: join_error.to_string(),
                }),
            }
        }

        cancel.cancel();
        if let Some(handle) = progress {
            let _ = handle.await;
        }

        if errors.len() == 1 {
            if let Some(error) = errors.pop() {
                return Err(error);
            }
        }
        if !errors.is_empty() {
            return Err(ResolveError::Multiple { errors });
        }

        let set = ResolvedSet {
            entries: resolved.into_iter().flatten().collect(),
        };
        info!(resolved = set.len(), "Dependencies resolved");

        if self.options.prune {
            self.prune(cache_root, &set).await;
        }
        Ok(set)
    }

    /// Remove cache files outside `set`. Failures are logged, not returned:
    /// resolution already succeeded.
    async fn prune(&self, cache_root: &Path, set: &ResolvedSet) {
        let root = cache_root.to_path_buf();
        let keep = set.whitelist();
        let outcome = tokio::task::spawn_blocking(move || cache::prune(&root, &keep)).await;
        match outcome {
            Ok(Ok(PruneStats {
                files_removed,
                directories_removed,
            })) => {
                if files_removed > 0 || directories_removed > 0 {
                    info!(files_removed, directories_removed, "Pruned cache");
                }
            },
            Ok(Err(e)) => warn!(error = %e, "Cache pruning failed"),
            Err(e) => warn!(error = %e, "Cache pruning task failed"),
        }
    }
}

/// Verify the cached copy of one dependency, or fetch it from the first
/// repository that serves it intact.
async fn resolve_one(
    pass: &Pass,
    dependency: Dependency,
    slot: CacheSlot,
) -> ResolveResult<ResolvedDependency> {
    let check = slot.clone();
    let cached = tokio::task::spawn_blocking(move || cache::verify_slot(&check))
        .await
        .unwrap_or(false);
    if cached {
        debug!(dependency = %dependency, "Cache hit");
        return Ok(ResolvedDependency { dependency, slot });
    }

    let mut attempts = Vec::new();
    for repository in &pass.repositories {
        match fetch_from(pass, repository, &dependency, &slot).await {
            Ok(()) => {
                info!(dependency = %dependency, repository = %repository, "Downloaded");
                return Ok(ResolvedDependency { dependency, slot });
            },
            Err(error) => {
                let retryable = error.is_retryable();
                warn!(
                    dependency = %dependency,
                    repository = %repository,
                    error = %error,
                    "Repository attempt failed"
                );
                attempts.push(RepositoryAttempt {
                    repository: repository.clone(),
                    error,
                });
                if !retryable {
                    break;
                }
            },
        }
    }

    Err(ResolveError::Unresolved {
        dependency: dependency.to_string(),
        attempts,
    })
}

/// One attempt against one repository.
async fn fetch_from(
    pass: &Pass,
    repository: &str,
    dependency: &Dependency,
    slot: &CacheSlot,
) -> ResolveResult<()> {
    // Cheap trust check before any large transfer.
    let sidecar_url = dependency.sha1_url(repository);
    let text = pass.transport.fetch_text(&sidecar_url).await?;
    let published = parse_sha1_sidecar(&text).ok_or_else(|| ResolveError::EmptySidecar {
        url: sidecar_url.clone(),
    })?;
    if published != dependency.sha1() {
        return Err(ResolveError::RepositoryHashMismatch {
            repository: repository.to_string(),
            dependency: dependency.to_string(),
            expected: dependency.sha1().to_string(),
            published,
        });
    }

    let download = cache::staging_file(&pass.scratch_dir)?;
    let jar_url = dependency.jar_url(repository);
    let actual = pass.transport.download(&jar_url, download.path()).await?;
    if actual != published {
        return Err(ResolveError::TransferIntegrity {
            url: jar_url,
            expected: published,
            actual,
        });
    }

    let rules = pass.rules.clone();
    let slot = slot.clone();
    let name = dependency.to_string();
    tokio::task::spawn_blocking(move || install(&download, &slot, rules, &name))
        .await
        .map_err(|e| ResolveError::TaskFailed {
            message: e.to_string(),
        })?
}

/// Relocate a verified download into its cache slot and record the stored
/// archive's hash. Both files appear through atomic renames.
fn install(
    download: &tempfile::NamedTempFile,
    slot: &CacheSlot,
    rules: RelocationRules,
    dependency: &str,
) -> ResolveResult<()> {
    let dir = slot
        .directory()
        .ok_or_else(|| ResolveError::io(&slot.archive, std::io::Error::other("no parent")))?;
    std::fs::create_dir_all(dir).map_err(|e| ResolveError::io(dir, e))?;

    let staged = cache::staging_file(dir)?;
    JarRelocator::new(download.path(), staged.path(), rules)
        .run()
        .map_err(|source| ResolveError::Relocation {
            dependency: dependency.to_string(),
            source,
        })?;
    let stored = sha1_file(staged.path()).map_err(|e| ResolveError::io(staged.path(), e))?;

    cache::persist(staged, &slot.archive)?;
    cache::write_atomic(&slot.sidecar, stored.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_workers_is_positive() {
        assert!(default_workers() >= 1);
    }

    #[test]
    fn zero_workers_falls_back() {
        let mut options = ResolverOptions::new("/tmp/scratch");
        options.workers = Some(0);
        assert!(options.effective_workers() >= 1);
        options.workers = Some(3);
        assert_eq!(options.effective_workers(), 3);
    }

    #[test]
    fn effective_rules_merge_and_disable() {
        let tmp = tempfile::tempdir().unwrap();
        let mut options = ResolverOptions::new(tmp.path().join("scratch"));
        options.extra_rules =
            RelocationRules::from_pairs([("a.b", "ignored"), ("c.d", "z.w")]).unwrap();
        let resolver = Resolver::new(options).unwrap();
        let manifest = Manifest::parse(
            r#"{"repositories": [], "dependencies": [], "relocations": {"a.b": "x.y"}}"#,
        )
        .unwrap();

        let rules = resolver.effective_rules(&manifest);
        assert_eq!(rules.len(), 2);
        assert_eq!(rules.map_class("a.b.C").as_deref(), Some("x.y.C"));
        assert_eq!(rules.map_class("c.d.E").as_deref(), Some("z.w.E"));

        let mut options = resolver.options().clone();
        options.relocate = false;
        let resolver = Resolver::new(options).unwrap();
        assert!(resolver.effective_rules(&manifest).is_empty());
    }
}
