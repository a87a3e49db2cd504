//! Dependency identity.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ManifestError, ManifestResult};
use crate::hash::is_sha1_hex;

/// A Maven artifact plus the SHA-1 of its canonical, un-relocated bytes.
///
/// Identity is structural: two dependencies with the same coordinates and
/// hash are equal. Values are validated on construction and immutable
/// afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawDependency", into = "RawDependency")]
pub struct Dependency {
    group: String,
    artifact: String,
    version: String,
    classifier: Option<String>,
    sha1: String,
}

/// Wire shape of a dependency entry in the manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawDependency {
    group: String,
    artifact: String,
    version: String,
    #[serde(default)]
    classifier: Option<String>,
    sha1: String,
}

impl TryFrom<RawDependency> for Dependency {
    type Error = ManifestError;

    fn try_from(raw: RawDependency) -> ManifestResult<Self> {
        Self::new(raw.group, raw.artifact, raw.version, raw.classifier, raw.sha1)
    }
}

impl From<Dependency> for RawDependency {
    fn from(dep: Dependency) -> Self {
        Self {
            group: dep.group,
            artifact: dep.artifact,
            version: dep.version,
            classifier: dep.classifier,
            sha1: dep.sha1,
        }
    }
}

impl Dependency {
    /// Create and validate a dependency.
    ///
    /// An empty classifier is treated as absent. The hash is normalised to
    /// lower case.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::InvalidDependency`] if a coordinate is empty
    /// or unsafe as a path component, or if `sha1` is not 40 hex digits.
    pub fn new(
        group: impl Into<String>,
        artifact: impl Into<String>,
        version: impl Into<String>,
        classifier: Option<String>,
        sha1: impl Into<String>,
    ) -> ManifestResult<Self> {
        let group = group.into();
        let artifact = artifact.into();
        let version = version.into();
        let sha1 = sha1.into();
        let classifier = classifier.filter(|c| !c.is_empty());

        validate_component("group", &group)?;
        validate_component("artifact", &artifact)?;
        validate_component("version", &version)?;
        if let Some(classifier) = &classifier {
            validate_component("classifier", classifier)?;
        }
        if !is_sha1_hex(&sha1) {
            return Err(ManifestError::InvalidDependency {
                field: "sha1",
                value: sha1,
                reason: "expected 40 hexadecimal digits".into(),
            });
        }

        Ok(Self {
            group,
            artifact,
            version,
            classifier,
            sha1: sha1.to_ascii_lowercase(),
        })
    }

    /// Group id, dotted (`org.example`).
    #[must_use]
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Artifact id.
    #[must_use]
    pub fn artifact(&self) -> &str {
        &self.artifact
    }

    /// Version string.
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Optional classifier.
    #[must_use]
    pub fn classifier(&self) -> Option<&str> {
        self.classifier.as_deref()
    }

    /// Expected SHA-1 of the upstream artifact, lowercase hex.
    #[must_use]
    pub fn sha1(&self) -> &str {
        &self.sha1
    }

    /// `version`, or `version-classifier` when a classifier is present.
    #[must_use]
    pub fn version_with_classifier(&self) -> String {
        match &self.classifier {
            Some(classifier) => format!("{}-{classifier}", self.version),
            None => self.version.clone(),
        }
    }

    /// Repository-relative path of the artifact:
    /// `group/with/slashes/artifact/version/artifact-versionWithClassifier.jar`.
    #[must_use]
    pub fn repository_path(&self) -> String {
        format!(
            "{}/{}/{}/{}-{}.jar",
            self.group.replace('.', "/"),
            self.artifact,
            self.version,
            self.artifact,
            self.version_with_classifier()
        )
    }

    /// Artifact URL under a repository base. A trailing `/` on the base is
    /// ignored.
    #[must_use]
    pub fn jar_url(&self, base: &str) -> String {
        format!("{}/{}", base.trim_end_matches('/'), self.repository_path())
    }

    /// URL of the repository-published SHA-1 sidecar for the artifact.
    #[must_use]
    pub fn sha1_url(&self, base: &str) -> String {
        format!("{}.sha1", self.jar_url(base))
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.group, self.artifact, self.version)?;
        if let Some(classifier) = &self.classifier {
            write!(f, ":{classifier}")?;
        }
        Ok(())
    }
}

/// Coordinates become cache path components, so they must not be able to
/// escape their directory.
fn validate_component(field: &'static str, value: &str) -> ManifestResult<()> {
    let reason = if value.is_empty() {
        Some("must not be empty")
    } else if value.contains(['/', '\\']) {
        Some("must not contain path separators")
    } else if value.contains("..") {
        Some("must not contain '..'")
    } else if value.chars().any(char::is_control) {
        Some("must not contain control characters")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(ManifestError::InvalidDependency {
            field,
            value: value.to_string(),
            reason: reason.into(),
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHA: &str = "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed";

    fn dep(classifier: Option<&str>) -> Dependency {
        Dependency::new(
            "org.example",
            "widget",
            "1.2.3",
            classifier.map(String::from),
            SHA,
        )
        .unwrap()
    }

    #[test]
    fn version_with_classifier() {
        assert_eq!(dep(None).version_with_classifier(), "1.2.3");
        assert_eq!(dep(Some("all")).version_with_classifier(), "1.2.3-all");
    }

    #[test]
    fn empty_classifier_is_absent() {
        assert_eq!(dep(Some("")).classifier(), None);
    }

    #[test]
    fn maven_urls() {
        let d = dep(Some("all"));
        assert_eq!(
            d.jar_url("https://repo.example/maven2/"),
            "https://repo.example/maven2/org/example/widget/1.2.3/widget-1.2.3-all.jar"
        );
        assert_eq!(
            d.sha1_url("https://repo.example/maven2"),
            "https://repo.example/maven2/org/example/widget/1.2.3/widget-1.2.3-all.jar.sha1"
        );
    }

    #[test]
    fn sha_is_lowercased() {
        let d = Dependency::new("g", "a", "1", None, SHA.to_ascii_uppercase()).unwrap();
        assert_eq!(d.sha1(), SHA);
    }

    #[test]
    fn rejects_unsafe_coordinates() {
        assert!(Dependency::new("", "a", "1", None, SHA).is_err());
        assert!(Dependency::new("g", "a/b", "1", None, SHA).is_err());
        assert!(Dependency::new("g", "a", "..", None, SHA).is_err());
        assert!(Dependency::new("g", "a", "1", Some("x\\y".into()), SHA).is_err());
    }

    #[test]
    fn rejects_bad_hash() {
        let err = Dependency::new("g", "a", "1", None, "abc").unwrap_err();
        assert!(matches!(
            err,
            ManifestError::InvalidDependency { field: "sha1", .. }
        ));
    }

    #[test]
    fn display_coordinates() {
        assert_eq!(dep(None).to_string(), "org.example:widget:1.2.3");
        assert_eq!(dep(Some("all")).to_string(), "org.example:widget:1.2.3:all");
    }

    #[test]
    fn deserializes_with_validation() {
        let json = format!(
            r#"{{"group":"g","artifact":"a","version":"1","classifier":null,"sha1":"{SHA}"}}"#
        );
        let d: Dependency = serde_json::from_str(&json).unwrap();
        assert_eq!(d.artifact(), "a");

        let bad = r#"{"group":"g","artifact":"a","version":"1","sha1":"nope"}"#;
        assert!(serde_json::from_str::<Dependency>(bad).is_err());
    }
}
