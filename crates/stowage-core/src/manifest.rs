//! Manifest decoding.
//!
//! The manifest travels as JSON inside the bootstrapped archive:
//!
//! ```json
//! {
//!   "repositories": ["https://repo.example/maven2"],
//!   "dependencies": [
//!     {"group": "g", "artifact": "a", "version": "1", "classifier": null, "sha1": "..."}
//!   ],
//!   "relocations": {"from.package": "to.package"}
//! }
//! ```
//!
//! `repositories` and `dependencies` are required; `relocations` defaults to
//! no rules. Other keys, at the top level or inside a dependency, are
//! ignored.

use std::str::FromStr;

use indexmap::{IndexMap, IndexSet};
use serde::Deserialize;

use crate::cache::CacheSlot;
use crate::dependency::Dependency;
use crate::error::{ManifestError, ManifestResult};
use crate::relocation::RelocationRules;

#[derive(Debug, Deserialize)]
struct RawManifest {
    repositories: Vec<String>,
    dependencies: Vec<Dependency>,
    #[serde(default)]
    relocations: IndexMap<String, String>,
}

/// Repositories, dependencies and relocation rules of one archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifest {
    repositories: IndexSet<String>,
    dependencies: IndexSet<Dependency>,
    relocations: RelocationRules,
}

impl Manifest {
    /// Assemble a manifest from already-validated parts.
    ///
    /// Duplicate repositories and dependencies collapse, keeping the first
    /// occurrence's position.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::InvalidRepository`] for a repository that is
    /// not an `http` or `https` URL.
    pub fn new(
        repositories: impl IntoIterator<Item = String>,
        dependencies: impl IntoIterator<Item = Dependency>,
        relocations: RelocationRules,
    ) -> ManifestResult<Self> {
        let mut repos = IndexSet::new();
        for url in repositories {
            validate_repository(&url)?;
            repos.insert(url);
        }
        Ok(Self {
            repositories: repos,
            dependencies: dependencies.into_iter().collect(),
            relocations,
        })
    }

    /// Decode and validate manifest JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::Malformed`] when the JSON does not have the
    /// expected shape, or a validation variant for unusable values.
    pub fn parse(json: &str) -> ManifestResult<Self> {
        Self::from_slice(json.as_bytes())
    }

    /// Decode and validate manifest JSON from raw bytes.
    ///
    /// # Errors
    ///
    /// Same as [`Manifest::parse`].
    pub fn from_slice(bytes: &[u8]) -> ManifestResult<Self> {
        let raw: RawManifest = serde_json::from_slice(bytes)?;
        let relocations = RelocationRules::from_pairs(raw.relocations)?;
        Self::new(raw.repositories, raw.dependencies, relocations)
    }

    /// Repository base URLs, in the order they are tried.
    pub fn repositories(&self) -> impl ExactSizeIterator<Item = &str> {
        self.repositories.iter().map(String::as_str)
    }

    /// Declared dependencies in manifest order.
    pub fn dependencies(&self) -> impl ExactSizeIterator<Item = &Dependency> {
        self.dependencies.iter()
    }

    /// Relocation rules declared by the manifest.
    #[must_use]
    pub fn relocations(&self) -> &RelocationRules {
        &self.relocations
    }

    /// Set hash of the manifest's own rules.
    #[must_use]
    pub fn relocation_set_hash(&self) -> String {
        self.relocations.set_hash()
    }

    /// Cache slot of every dependency under `rules`, in manifest order.
    #[must_use]
    pub fn cache_slots(
        &self,
        cache_root: &std::path::Path,
        rules: &RelocationRules,
    ) -> Vec<(Dependency, CacheSlot)> {
        let set_hash = rules.set_hash();
        self.dependencies
            .iter()
            .map(|dep| (dep.clone(), CacheSlot::new(dep, cache_root, &set_hash)))
            .collect()
    }
}

impl FromStr for Manifest {
    type Err = ManifestError;

    fn from_str(s: &str) -> ManifestResult<Self> {
        Self::parse(s)
    }
}

fn validate_repository(url: &str) -> ManifestResult<()> {
    let invalid = |reason: &str| ManifestError::InvalidRepository {
        url: url.to_string(),
        reason: reason.to_string(),
    };

    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .ok_or_else(|| invalid("scheme must be http or https"))?;
    if rest.trim_end_matches('/').is_empty() {
        return Err(invalid("missing host"));
    }
    if url.chars().any(char::is_whitespace) {
        return Err(invalid("must not contain whitespace"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHA: &str = "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed";

    fn sample() -> String {
        format!(
            r#"{{
                "repositories": ["https://one.example/maven2", "https://two.example/"],
                "dependencies": [
                    {{"group": "org.example", "artifact": "widget", "version": "1.0", "classifier": null, "sha1": "{SHA}"}},
                    {{"group": "org.example", "artifact": "gadget", "version": "2.0", "classifier": "all", "sha1": "{SHA}"}}
                ],
                "relocations": {{"org.example": "shaded.example", "com.other": "shaded.other"}}
            }}"#
        )
    }

    #[test]
    fn parses_sample() {
        let manifest = Manifest::parse(&sample()).unwrap();
        assert_eq!(manifest.repositories().count(), 2);
        let deps: Vec<_> = manifest.dependencies().map(Dependency::artifact).collect();
        assert_eq!(deps, ["widget", "gadget"]);
        let patterns: Vec<_> = manifest.relocations().iter().map(|r| r.pattern()).collect();
        assert_eq!(patterns, ["org.example", "com.other"]);
    }

    #[test]
    fn relocations_default_to_empty() {
        let json = r#"{"repositories": [], "dependencies": []}"#;
        let manifest: Manifest = json.parse().unwrap();
        assert!(manifest.relocations().is_empty());
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let json = format!(
            r#"{{
                "format": 2,
                "repositories": ["https://one.example/maven2"],
                "dependencies": [
                    {{"group": "g", "artifact": "a", "version": "1", "sha1": "{SHA}", "scope": "runtime"}}
                ],
                "generatedBy": "build"
            }}"#
        );
        let manifest = Manifest::parse(&json).unwrap();
        assert_eq!(manifest.repositories().count(), 1);
        assert_eq!(manifest.dependencies().count(), 1);
    }

    #[test]
    fn missing_field_is_malformed() {
        let err = Manifest::parse(r#"{"repositories": []}"#).unwrap_err();
        assert!(matches!(err, ManifestError::Malformed { .. }));
    }

    #[test]
    fn non_string_repository_is_malformed() {
        let err = Manifest::parse(r#"{"repositories": [1], "dependencies": []}"#).unwrap_err();
        assert!(matches!(err, ManifestError::Malformed { .. }));
    }

    #[test]
    fn non_string_relocation_is_malformed() {
        let json = r#"{"repositories": [], "dependencies": [], "relocations": {"a": 1}}"#;
        assert!(matches!(
            Manifest::parse(json).unwrap_err(),
            ManifestError::Malformed { .. }
        ));
    }

    #[test]
    fn missing_dependency_field_is_malformed() {
        let json = r#"{"repositories": [], "dependencies": [{"group": "g", "artifact": "a"}]}"#;
        assert!(matches!(
            Manifest::parse(json).unwrap_err(),
            ManifestError::Malformed { .. }
        ));
    }

    #[test]
    fn rejects_non_http_repository() {
        let json = r#"{"repositories": ["file:///tmp"], "dependencies": []}"#;
        assert!(matches!(
            Manifest::parse(json).unwrap_err(),
            ManifestError::InvalidRepository { .. }
        ));
    }

    #[test]
    fn duplicates_collapse() {
        let json = format!(
            r#"{{
                "repositories": ["https://r.example", "https://r.example"],
                "dependencies": [
                    {{"group": "g", "artifact": "a", "version": "1", "sha1": "{SHA}"}},
                    {{"group": "g", "artifact": "a", "version": "1", "sha1": "{}"}}
                ]
            }}"#,
            SHA.to_ascii_uppercase()
        );
        let manifest = Manifest::parse(&json).unwrap();
        assert_eq!(manifest.repositories().len(), 1);
        assert_eq!(manifest.dependencies().len(), 1);
    }

    #[test]
    fn cache_slots_follow_manifest_order() {
        let manifest = Manifest::parse(&sample()).unwrap();
        let slots = manifest.cache_slots(std::path::Path::new("/c"), manifest.relocations());
        assert_eq!(slots.len(), 2);
        assert!(slots[0].1.archive.starts_with("/c/org.example/widget/1.0"));
        assert!(slots[1].1.archive.starts_with("/c/org.example/gadget/2.0-all"));
    }
}
