//! Test fixtures for manifests and directories.

use std::path::{Path, PathBuf};

use stowage_core::Dependency;
use tempfile::TempDir;

/// Throwaway cache and scratch directories under one temp root.
#[derive(Debug)]
pub struct TestDirs {
    root: TempDir,
    /// Cache root.
    pub cache: PathBuf,
    /// Scratch directory.
    pub scratch: PathBuf,
}

impl TestDirs {
    /// Create the directory pair. The cache and scratch directories
    /// themselves are not created.
    ///
    /// # Panics
    ///
    /// Panics if the temp root cannot be created.
    #[must_use]
    pub fn new() -> Self {
        let root = tempfile::tempdir().expect("temp root");
        let cache = root.path().join("cache");
        let scratch = root.path().join("scratch");
        Self {
            root,
            cache,
            scratch,
        }
    }

    /// The temp root.
    #[must_use]
    pub fn root(&self) -> &Path {
        self.root.path()
    }
}

impl Default for TestDirs {
    fn default() -> Self {
        Self::new()
    }
}

/// Encode a manifest as JSON.
///
/// # Panics
///
/// Panics if serialization fails.
#[must_use]
pub fn manifest_json(
    repositories: &[String],
    dependencies: &[Dependency],
    relocations: &[(&str, &str)],
) -> String {
    let relocations: serde_json::Map<String, serde_json::Value> = relocations
        .iter()
        .map(|(from, to)| ((*from).to_string(), serde_json::Value::from(*to)))
        .collect();
    serde_json::json!({
        "repositories": repositories,
        "dependencies": dependencies,
        "relocations": relocations,
    })
    .to_string()
}

/// Install a test-friendly tracing subscriber. Safe to call repeatedly.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
        )
        .with_test_writer()
        .try_init();
}

/// List every file under `root`, relative and sorted.
///
/// # Panics
///
/// Panics if a directory cannot be read.
#[must_use]
pub fn list_files(root: &Path) -> Vec<PathBuf> {
    fn walk(dir: &Path, root: &Path, out: &mut Vec<PathBuf>) {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return;
        };
        for entry in entries {
            let path = entry.expect("directory entry").path();
            if path.is_dir() {
                walk(&path, root, out);
            } else if let Ok(relative) = path.strip_prefix(root) {
                out.push(relative.to_path_buf());
            }
        }
    }

    let mut files = Vec::new();
    walk(root, root, &mut files);
    files.sort();
    files
}
