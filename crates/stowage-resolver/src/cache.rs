//! Cache root maintenance: verification, atomic installs and pruning.

use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use stowage_core::CacheSlot;
use stowage_core::hash::{parse_sha1_sidecar, sha1_file};
use tempfile::NamedTempFile;
use tracing::{debug, trace};
use walkdir::WalkDir;

use crate::error::{ResolveError, ResolveResult};

/// Whether `slot` holds an archive whose hash matches its sidecar.
///
/// Any read failure counts as a miss; the caller re-downloads.
pub(crate) fn verify_slot(slot: &CacheSlot) -> bool {
    let Ok(recorded) = std::fs::read_to_string(&slot.sidecar) else {
        return false;
    };
    let Some(recorded) = parse_sha1_sidecar(&recorded) else {
        return false;
    };
    match sha1_file(&slot.archive) {
        Ok(actual) if actual == recorded => true,
        Ok(actual) => {
            debug!(
                archive = %slot.archive.display(),
                recorded = %recorded,
                actual = %actual,
                "Cached archive does not match its sidecar"
            );
            false
        },
        Err(_) => false,
    }
}

/// Create a temp file in `dir`, the directory its final path lives in, so
/// that persisting it is a rename on the same file system.
pub(crate) fn staging_file(dir: &Path) -> ResolveResult<NamedTempFile> {
    tempfile::Builder::new()
        .prefix(".stowage-")
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(|e| ResolveError::io(dir, e))
}

/// Atomically move a staged file to `path`.
pub(crate) fn persist(staged: NamedTempFile, path: &Path) -> ResolveResult<()> {
    staged
        .persist(path)
        .map(|_| ())
        .map_err(|e| ResolveError::io(path, e.error))
}

/// Write `contents` to `path` through a temp file and a rename.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> ResolveResult<()> {
    let dir = path
        .parent()
        .ok_or_else(|| ResolveError::io(path, std::io::Error::other("path has no parent")))?;
    let mut staged = staging_file(dir)?;
    staged
        .write_all(contents)
        .map_err(|e| ResolveError::io(staged.path().to_path_buf(), e))?;
    staged
        .as_file()
        .sync_all()
        .map_err(|e| ResolveError::io(staged.path().to_path_buf(), e))?;
    persist(staged, path)
}

/// Empty `dir`, creating it if missing.
///
/// # Errors
///
/// Returns an I/O error if the directory cannot be created or an entry in
/// it cannot be removed.
pub fn clear_directory(dir: &Path) -> ResolveResult<()> {
    std::fs::create_dir_all(dir).map_err(|e| ResolveError::io(dir, e))?;
    let entries = std::fs::read_dir(dir).map_err(|e| ResolveError::io(dir, e))?;
    for entry in entries {
        let path = entry.map_err(|e| ResolveError::io(dir, e))?.path();
        let result = if path.is_dir() {
            std::fs::remove_dir_all(&path)
        } else {
            std::fs::remove_file(&path)
        };
        result.map_err(|e| ResolveError::io(&path, e))?;
    }
    Ok(())
}

/// What a pruning pass removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneStats {
    /// Files deleted.
    pub files_removed: usize,
    /// Directories deleted.
    pub directories_removed: usize,
}

/// Delete every file under `root` that is not in `keep`, then every
/// directory left empty. The root itself is never removed.
///
/// Directories that still hold files are left in place silently.
///
/// # Errors
///
/// Returns an I/O error if a stale file cannot be deleted. A missing root
/// is not an error.
pub fn prune(root: &Path, keep: &HashSet<PathBuf>) -> ResolveResult<PruneStats> {
    let mut stats = PruneStats::default();
    if !root.exists() {
        return Ok(stats);
    }

    for entry in WalkDir::new(root).min_depth(1).contents_first(true) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).to_path_buf();
            ResolveError::io(path, e.into())
        })?;
        let path = entry.path();

        if entry.file_type().is_dir() {
            // Fails for directories that still hold kept files.
            if std::fs::remove_dir(path).is_ok() {
                trace!(path = %path.display(), "Removed empty directory");
                stats.directories_removed = stats.directories_removed.saturating_add(1);
            }
        } else if !keep.contains(path) {
            std::fs::remove_file(path).map_err(|e| ResolveError::io(path, e))?;
            debug!(path = %path.display(), "Pruned stale cache file");
            stats.files_removed = stats.files_removed.saturating_add(1);
        }
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use stowage_core::Dependency;
    use stowage_core::hash::sha1_hex;

    fn slot(root: &Path) -> CacheSlot {
        let dep = Dependency::new("g", "a", "1", None, sha1_hex(b"x")).unwrap();
        CacheSlot::new(&dep, root, "rules")
    }

    #[test]
    fn verify_requires_matching_sidecar() {
        let tmp = tempfile::tempdir().unwrap();
        let slot = slot(tmp.path());
        assert!(!verify_slot(&slot));

        std::fs::create_dir_all(slot.directory().unwrap()).unwrap();
        std::fs::write(&slot.archive, b"stored").unwrap();
        assert!(!verify_slot(&slot));

        write_atomic(&slot.sidecar, sha1_hex(b"stored").as_bytes()).unwrap();
        assert!(verify_slot(&slot));

        std::fs::write(&slot.archive, b"tampered").unwrap();
        assert!(!verify_slot(&slot));
    }

    #[test]
    fn write_atomic_leaves_no_temp_files() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("file.sha1");
        write_atomic(&path, b"one").unwrap();
        write_atomic(&path, b"two").unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"two");
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 1);
    }

    #[test]
    fn prune_keeps_whitelist_and_shared_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        let kept = root.join("g/a/1/kept.jar");
        let stale_sibling = root.join("g/a/1/stale.jar");
        let stale_tree = root.join("old/x/1/old.jar");
        for path in [&kept, &stale_sibling, &stale_tree] {
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, b"data").unwrap();
        }

        let keep: HashSet<PathBuf> = [kept.clone()].into_iter().collect();
        let stats = prune(root, &keep).unwrap();

        assert!(kept.exists());
        assert!(!stale_sibling.exists());
        assert!(!root.join("old").exists());
        assert!(root.exists());
        assert_eq!(stats.files_removed, 2);
        assert_eq!(stats.directories_removed, 3);
    }

    #[test]
    fn prune_missing_root_is_noop() {
        let tmp = tempfile::tempdir().unwrap();
        let stats = prune(&tmp.path().join("absent"), &HashSet::new()).unwrap();
        assert_eq!(stats, PruneStats::default());
    }

    #[test]
    fn clear_directory_empties_and_creates() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("scratch");
        clear_directory(&dir).unwrap();
        std::fs::create_dir_all(dir.join("nested")).unwrap();
        std::fs::write(dir.join("nested/file"), b"x").unwrap();
        std::fs::write(dir.join("top"), b"x").unwrap();

        clear_directory(&dir).unwrap();
        assert!(dir.exists());
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 0);
    }
}
