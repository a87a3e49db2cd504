//! Lookup scopes over archives.
//!
//! A [`Scope`] answers "where does this class or resource come from?". An
//! [`IsolatedScope`] searches its own archives before its parent, so a
//! bundled, relocated dependency can never be shadowed by a same-named
//! definition the host already has.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;
use zip::ZipArchive;

use crate::error::{LoaderError, LoaderResult};

/// Directory holding service registration files.
pub const SERVICES_DIR: &str = "META-INF/services/";

/// Archive entry name of the class with binary name `a.b.C`.
#[must_use]
pub fn class_entry_name(binary_name: &str) -> String {
    format!("{}.class", binary_name.replace('.', "/"))
}

/// One resource inside one archive.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceRef {
    /// Archive holding the entry.
    pub archive: PathBuf,
    /// Entry name inside the archive.
    pub entry: String,
}

impl ResourceRef {
    /// Read the entry's contents.
    ///
    /// # Errors
    ///
    /// Returns an error if the archive or entry cannot be read.
    pub fn read(&self) -> LoaderResult<Vec<u8>> {
        let file = File::open(&self.archive).map_err(|e| LoaderError::io(&self.archive, e))?;
        let mut archive = ZipArchive::new(BufReader::new(file))
            .map_err(|e| LoaderError::archive(&self.archive, e))?;
        let mut entry = archive
            .by_name(&self.entry)
            .map_err(|e| LoaderError::archive(&self.archive, e))?;
        let mut data = Vec::new();
        entry
            .read_to_end(&mut data)
            .map_err(|e| LoaderError::io(&self.archive, e))?;
        Ok(data)
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}!/{}", self.archive.display(), self.entry)
    }
}

/// A place classes and resources are looked up.
pub trait Scope: Send + Sync + fmt::Debug {
    /// The first resource named `name` visible from this scope.
    fn find_resource(&self, name: &str) -> Option<ResourceRef>;

    /// Every resource named `name` visible from this scope, in lookup order.
    fn resources(&self, name: &str) -> Vec<ResourceRef>;

    /// The class with binary name `binary_name` (`a.b.C`).
    fn find_class(&self, binary_name: &str) -> Option<ResourceRef> {
        self.find_resource(&class_entry_name(binary_name))
    }
}

/// A scope that contains nothing. The usual root parent.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyScope;

impl Scope for EmptyScope {
    fn find_resource(&self, _name: &str) -> Option<ResourceRef> {
        None
    }

    fn resources(&self, _name: &str) -> Vec<ResourceRef> {
        Vec::new()
    }
}

/// Indexed lookup over an ordered list of archives. When several archives
/// hold the same entry, the earliest archive wins.
#[derive(Debug, Clone, Default)]
pub struct ArchiveScope {
    archives: Vec<PathBuf>,
    /// Entry name to the indexes of every archive holding it, ascending.
    index: HashMap<String, Vec<usize>>,
}

impl ArchiveScope {
    /// Index `archives`. A path listed twice is indexed once, at its first
    /// position.
    ///
    /// # Errors
    ///
    /// Returns an error if an archive cannot be opened or read.
    pub fn open<I, P>(archives: I) -> LoaderResult<Self>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut scope = Self::default();
        let mut seen = HashSet::new();
        for path in archives {
            let path = path.as_ref();
            if !seen.insert(path.to_path_buf()) {
                continue;
            }
            scope.add(path)?;
        }
        Ok(scope)
    }

    fn add(&mut self, path: &Path) -> LoaderResult<()> {
        let file = File::open(path).map_err(|e| LoaderError::io(path, e))?;
        let archive =
            ZipArchive::new(BufReader::new(file)).map_err(|e| LoaderError::archive(path, e))?;
        let position = self.archives.len();
        for name in archive.file_names() {
            self.index.entry(name.to_owned()).or_default().push(position);
        }
        debug!(archive = %path.display(), entries = archive.len(), "Indexed archive");
        self.archives.push(path.to_path_buf());
        Ok(())
    }

    /// Archives in lookup order.
    #[must_use]
    pub fn archives(&self) -> &[PathBuf] {
        &self.archives
    }

    fn reference(&self, position: usize, name: &str) -> Option<ResourceRef> {
        self.archives.get(position).map(|archive| ResourceRef {
            archive: archive.clone(),
            entry: name.to_owned(),
        })
    }
}

impl Scope for ArchiveScope {
    fn find_resource(&self, name: &str) -> Option<ResourceRef> {
        let &first = self.index.get(name)?.first()?;
        self.reference(first, name)
    }

    fn resources(&self, name: &str) -> Vec<ResourceRef> {
        self.index
            .get(name)
            .map(|positions| {
                positions
                    .iter()
                    .filter_map(|&p| self.reference(p, name))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Child-first scope: local archives shadow everything reachable through
/// the parent.
#[derive(Debug, Clone)]
pub struct IsolatedScope {
    local: ArchiveScope,
    parent: Arc<dyn Scope>,
}

impl IsolatedScope {
    /// Layer `local` over `parent`.
    #[must_use]
    pub fn new(local: ArchiveScope, parent: Arc<dyn Scope>) -> Self {
        Self { local, parent }
    }

    /// Archives searched before the parent, in order.
    #[must_use]
    pub fn archives(&self) -> &[PathBuf] {
        self.local.archives()
    }

    /// The fallback scope.
    #[must_use]
    pub fn parent(&self) -> &Arc<dyn Scope> {
        &self.parent
    }

    /// Whether `resource` came from this scope's own archives.
    #[must_use]
    pub fn is_local(&self, resource: &ResourceRef) -> bool {
        self.local.archives().contains(&resource.archive)
    }
}

impl Scope for IsolatedScope {
    fn find_resource(&self, name: &str) -> Option<ResourceRef> {
        self.local
            .find_resource(name)
            .or_else(|| self.parent.find_resource(name))
    }

    fn resources(&self, name: &str) -> Vec<ResourceRef> {
        let mut found = self.local.resources(name);
        found.extend(self.parent.resources(name));
        found
    }
}

/// Every provider registered for `interface` across `scope`, in lookup
/// order, without duplicates. Comments after `#` and blank lines are
/// ignored.
///
/// # Errors
///
/// Returns an error if a registration file cannot be read.
pub fn service_providers(scope: &dyn Scope, interface: &str) -> LoaderResult<Vec<String>> {
    let mut seen = HashSet::new();
    let mut providers = Vec::new();
    for resource in scope.resources(&format!("{SERVICES_DIR}{interface}")) {
        let data = resource.read()?;
        let text = String::from_utf8_lossy(&data);
        for line in text.lines() {
            let provider = line.split('#').next().unwrap_or_default().trim();
            if !provider.is_empty() && seen.insert(provider.to_owned()) {
                providers.push(provider.to_owned());
            }
        }
    }
    Ok(providers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use stowage_test::JarBuilder;
    use tempfile::TempDir;

    fn jar(dir: &TempDir, name: &str, builder: &JarBuilder) -> PathBuf {
        let path = dir.path().join(name);
        builder.write_to(&path);
        path
    }

    #[test]
    fn class_names_map_to_entries() {
        assert_eq!(class_entry_name("a.b.C"), "a/b/C.class");
        assert_eq!(class_entry_name("a.b.C$Inner"), "a/b/C$Inner.class");
    }

    #[test]
    fn first_archive_wins() {
        let tmp = tempfile::tempdir().unwrap();
        let one = jar(&tmp, "one.jar", &JarBuilder::new().entry("shared.txt", "one"));
        let two = jar(
            &tmp,
            "two.jar",
            &JarBuilder::new()
                .entry("shared.txt", "two")
                .class("a/b/Only", b"\xCA\xFE"),
        );

        let scope = ArchiveScope::open([&one, &two, &one]).unwrap();
        assert_eq!(scope.archives(), [one.clone(), two.clone()]);

        let shared = scope.find_resource("shared.txt").unwrap();
        assert_eq!(shared.archive, one);
        assert_eq!(shared.read().unwrap(), b"one");
        assert_eq!(scope.resources("shared.txt").len(), 2);
        assert_eq!(scope.find_class("a.b.Only").unwrap().archive, two);
        assert!(scope.find_resource("missing").is_none());
        assert!(scope.resources("missing").is_empty());
    }

    #[test]
    fn isolated_scope_is_child_first() {
        let tmp = tempfile::tempdir().unwrap();
        let host = jar(
            &tmp,
            "host.jar",
            &JarBuilder::new()
                .class("com/lib/Api", b"host")
                .entry("host-only.txt", "h"),
        );
        let bundled = jar(&tmp, "bundled.jar", &JarBuilder::new().class("com/lib/Api", b"bundled"));

        let parent: Arc<dyn Scope> = Arc::new(ArchiveScope::open([&host]).unwrap());
        let scope = IsolatedScope::new(ArchiveScope::open([&bundled]).unwrap(), parent);

        let api = scope.find_class("com.lib.Api").unwrap();
        assert_eq!(api.archive, bundled);
        assert!(scope.is_local(&api));
        assert_eq!(api.read().unwrap(), b"bundled");

        let fallback = scope.find_resource("host-only.txt").unwrap();
        assert_eq!(fallback.archive, host);
        assert!(!scope.is_local(&fallback));

        let all = scope.resources("com/lib/Api.class");
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].archive, bundled);
    }

    #[test]
    fn empty_scope_finds_nothing() {
        assert!(EmptyScope.find_class("java.lang.Object").is_none());
        assert!(EmptyScope.resources("x").is_empty());
    }

    #[test]
    fn service_providers_local_first_without_duplicates() {
        let tmp = tempfile::tempdir().unwrap();
        let host = jar(
            &tmp,
            "host.jar",
            &JarBuilder::new().service("a.Api", &["host.Impl", "shared.Impl"]),
        );
        let local = jar(
            &tmp,
            "local.jar",
            &JarBuilder::new().entry(
                "META-INF/services/a.Api",
                "# registered\nlocal.Impl\n\nshared.Impl # trailing\n",
            ),
        );

        let parent: Arc<dyn Scope> = Arc::new(ArchiveScope::open([&host]).unwrap());
        let scope = IsolatedScope::new(ArchiveScope::open([&local]).unwrap(), parent);

        assert_eq!(
            service_providers(&scope, "a.Api").unwrap(),
            ["local.Impl", "shared.Impl", "host.Impl"]
        );
        assert!(service_providers(&scope, "b.Other").unwrap().is_empty());
    }

    #[test]
    fn unreadable_archive_is_error() {
        let tmp = tempfile::tempdir().unwrap();
        let bogus = tmp.path().join("bogus.jar");
        std::fs::write(&bogus, b"not a zip").unwrap();
        assert!(matches!(
            ArchiveScope::open([&bogus]),
            Err(LoaderError::Archive { .. })
        ));
        assert!(matches!(
            ArchiveScope::open([tmp.path().join("absent.jar")]),
            Err(LoaderError::Io { .. })
        ));
    }
}
