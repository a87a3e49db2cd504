//! Deterministic cache addressing.

use std::path::{Path, PathBuf};

use crate::dependency::Dependency;

/// Extension of the sidecar file holding the stored archive's SHA-1.
pub const SIDECAR_EXTENSION: &str = "sha1";

/// Where a dependency lives in the cache: the archive and its sidecar.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheSlot {
    /// Relocated archive.
    pub archive: PathBuf,
    /// Sidecar with the archive's SHA-1.
    pub sidecar: PathBuf,
}

impl CacheSlot {
    /// Slot for `dependency` relocated under rules whose set hash is
    /// `relocation_set_hash`.
    #[must_use]
    pub fn new(dependency: &Dependency, cache_root: &Path, relocation_set_hash: &str) -> Self {
        let archive = compute_dependency_path(dependency, cache_root, relocation_set_hash);
        let sidecar = sidecar_path(&archive);
        Self { archive, sidecar }
    }

    /// Directory holding both files.
    #[must_use]
    pub fn directory(&self) -> Option<&Path> {
        self.archive.parent()
    }
}

/// Path of `dependency`'s archive in the cache:
/// `cache_root/group/artifact/versionWithClassifier/<sha1>-<setHash>.jar`.
///
/// Pure function of its inputs; every component addressing a cache slot
/// goes through here.
#[must_use]
pub fn compute_dependency_path(
    dependency: &Dependency,
    cache_root: &Path,
    relocation_set_hash: &str,
) -> PathBuf {
    cache_root
        .join(dependency.group())
        .join(dependency.artifact())
        .join(dependency.version_with_classifier())
        .join(format!("{}-{relocation_set_hash}.jar", dependency.sha1()))
}

/// Sidecar path for an archive: the archive path with `.sha1` appended.
#[must_use]
pub fn sidecar_path(archive: &Path) -> PathBuf {
    let mut name = archive.as_os_str().to_os_string();
    name.push(".");
    name.push(SIDECAR_EXTENSION);
    PathBuf::from(name)
}
