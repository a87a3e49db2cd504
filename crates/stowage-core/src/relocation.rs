//! Package relocation rules.
//!
//! A [`Relocation`] renames one package prefix to another. Rules are kept in
//! declared order inside [`RelocationRules`]; when several patterns could
//! match the same name, the first declared rule wins.
//!
//! Matching respects package boundaries: `a.b` matches `a.b` and `a.b.C`
//! but never `a.bc.D`. Names are handled in two spellings:
//!
//! - *class* form, dotted (`a.b.C`), as used in service files and strings
//! - *path* form, slashed (`a/b/C`), as used in class files and entry paths

use std::fmt;

use sha1::{Digest, Sha1};

use crate::error::{ManifestError, ManifestResult};

/// Separates a pattern from its replacement in the set hash.
const FIELD_DELIMITER: u8 = 0x1f;

/// Terminates one rule in the set hash.
const RECORD_DELIMITER: u8 = 0x1e;

/// A single package-prefix rename.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Relocation {
    pattern: String,
    replacement: String,
    path_pattern: String,
    path_replacement: String,
}

impl Relocation {
    /// Create a rule. Both sides accept dotted or slashed spelling.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::InvalidRelocation`] if either side is empty,
    /// has empty segments, or contains characters that cannot appear in a
    /// package name.
    pub fn new(pattern: impl Into<String>, replacement: impl Into<String>) -> ManifestResult<Self> {
        let raw_pattern = pattern.into();
        let raw_replacement = replacement.into();

        let invalid = |reason: String| ManifestError::InvalidRelocation {
            pattern: raw_pattern.clone(),
            replacement: raw_replacement.clone(),
            reason,
        };

        let pattern = raw_pattern.replace('/', ".");
        let replacement = raw_replacement.replace('/', ".");
        validate_package(&pattern).map_err(|r| invalid(format!("pattern {r}")))?;
        validate_package(&replacement).map_err(|r| invalid(format!("replacement {r}")))?;

        Ok(Self {
            path_pattern: pattern.replace('.', "/"),
            path_replacement: replacement.replace('.', "/"),
            pattern,
            replacement,
        })
    }

    /// Pattern in dotted form.
    #[must_use]
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Replacement in dotted form.
    #[must_use]
    pub fn replacement(&self) -> &str {
        &self.replacement
    }

    /// Relocate a slashed name (`a/b/C`), or `None` if the rule does not apply.
    #[must_use]
    pub fn relocate_path(&self, name: &str) -> Option<String> {
        let rest = strip_package(name, &self.path_pattern, '/')?;
        Some(format!("{}{rest}", self.path_replacement))
    }

    /// Relocate a dotted name (`a.b.C`), or `None` if the rule does not apply.
    #[must_use]
    pub fn relocate_class(&self, name: &str) -> Option<String> {
        let rest = strip_package(name, &self.pattern, '.')?;
        Some(format!("{}{rest}", self.replacement))
    }
}

impl fmt::Display for Relocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.pattern, self.replacement)
    }
}

/// Strip `prefix` from `name` if it ends on a package boundary.
fn strip_package<'a>(name: &'a str, prefix: &str, separator: char) -> Option<&'a str> {
    let rest = name.strip_prefix(prefix)?;
    if rest.is_empty() || rest.starts_with(separator) {
        Some(rest)
    } else {
        None
    }
}

/// Check that a dotted package name is well formed.
///
/// Characters outside the Basic Multilingual Plane are rejected because
/// class files store names in modified UTF-8, where they would need a
/// surrogate-pair encoding.
fn validate_package(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("must not be empty".into());
    }
    if name.split('.').any(str::is_empty) {
        return Err("must not contain empty segments".into());
    }
    if let Some(c) = name
        .chars()
        .find(|c| c.is_whitespace() || c.is_control() || matches!(c, ';' | '[' | '<' | '>'))
    {
        return Err(format!("contains illegal character {c:?}"));
    }
    if name.chars().any(|c| u32::from(c) > 0xFFFF) {
        return Err("contains characters outside the Basic Multilingual Plane".into());
    }
    Ok(())
}

/// Ordered set of relocation rules.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelocationRules {
    rules: Vec<Relocation>,
}

impl RelocationRules {
    /// Create an empty rule set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a rule set from `(pattern, replacement)` pairs in declared order.
    ///
    /// A pattern that repeats an earlier one is ignored.
    ///
    /// # Errors
    ///
    /// Returns the first invalid rule.
    pub fn from_pairs<I, K, V>(pairs: I) -> ManifestResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut rules = Self::new();
        for (pattern, replacement) in pairs {
            rules.push(Relocation::new(pattern, replacement)?);
        }
        Ok(rules)
    }

    /// Append a rule unless its pattern is already present.
    ///
    /// Returns `true` if the rule was added.
    pub fn push(&mut self, rule: Relocation) -> bool {
        if self.rules.iter().any(|r| r.pattern == rule.pattern) {
            return false;
        }
        self.rules.push(rule);
        true
    }

    /// Append every rule of `other` whose pattern is not already present.
    pub fn extend_missing(&mut self, other: &Self) {
        for rule in &other.rules {
            self.push(rule.clone());
        }
    }

    /// Whether there are no rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Number of rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Iterate rules in declared order.
    pub fn iter(&self) -> impl Iterator<Item = &Relocation> {
        self.rules.iter()
    }

    /// Relocate a slashed name with the first matching rule.
    #[must_use]
    pub fn map_path(&self, name: &str) -> Option<String> {
        self.rules.iter().find_map(|r| r.relocate_path(name))
    }

    /// Relocate a dotted name with the first matching rule.
    #[must_use]
    pub fn map_class(&self, name: &str) -> Option<String> {
        self.rules.iter().find_map(|r| r.relocate_class(name))
    }

    /// Stable digest of the rule set.
    ///
    /// Rules are sorted by pattern before hashing, so declaration order does
    /// not affect the digest. Each pattern and replacement is framed by
    /// delimiter bytes that validation keeps out of package names, so
    /// `"a" + "bc"` and `"ab" + "c"` hash differently.
    #[must_use]
    pub fn set_hash(&self) -> String {
        let mut sorted: Vec<&Relocation> = self.rules.iter().collect();
        sorted.sort_by(|a, b| a.pattern.cmp(&b.pattern));

        let mut hasher = Sha1::new();
        for rule in sorted {
            hasher.update(rule.pattern.as_bytes());
            hasher.update([FIELD_DELIMITER]);
            hasher.update(rule.replacement.as_bytes());
            hasher.update([RECORD_DELIMITER]);
        }
        hex::encode(hasher.finalize())
    }
}

impl<'a> IntoIterator for &'a RelocationRules {
    type Item = &'a Relocation;
    type IntoIter = std::slice::Iter<'a, Relocation>;

    fn into_iter(self) -> Self::IntoIter {
        self.rules.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules(pairs: &[(&str, &str)]) -> RelocationRules {
        RelocationRules::from_pairs(pairs.iter().copied()).unwrap()
    }

    #[test]
    fn relocates_class_and_path_forms() {
        let rule = Relocation::new("a.b", "x.y").unwrap();
        assert_eq!(rule.relocate_class("a.b.C").as_deref(), Some("x.y.C"));
        assert_eq!(rule.relocate_path("a/b/C").as_deref(), Some("x/y/C"));
        assert_eq!(rule.relocate_path("a/b").as_deref(), Some("x/y"));
    }

    #[test]
    fn respects_package_boundary() {
        let rule = Relocation::new("a.b", "x.y").unwrap();
        assert_eq!(rule.relocate_class("a.bc.D"), None);
        assert_eq!(rule.relocate_path("a/bc/D"), None);
        assert_eq!(rule.relocate_class("z.a.b.C"), None);
    }

    #[test]
    fn accepts_slashed_spelling() {
        let rule = Relocation::new("a/b", "x/y").unwrap();
        assert_eq!(rule.pattern(), "a.b");
        assert_eq!(rule.replacement(), "x.y");
    }

    #[test]
    fn rejects_bad_patterns() {
        assert!(Relocation::new("", "x").is_err());
        assert!(Relocation::new("a..b", "x").is_err());
        assert!(Relocation::new("a.b", "x y").is_err());
        assert!(Relocation::new("a.b.", "x").is_err());
        assert!(Relocation::new("a;b", "x").is_err());
    }

    #[test]
    fn first_declared_rule_wins() {
        let set = rules(&[("a.b", "first"), ("a", "second")]);
        assert_eq!(set.map_class("a.b.C").as_deref(), Some("first.C"));
        assert_eq!(set.map_class("a.z.C").as_deref(), Some("second.z.C"));
    }

    #[test]
    fn duplicate_pattern_ignored() {
        let set = rules(&[("a.b", "x.y"), ("a/b", "other")]);
        assert_eq!(set.len(), 1);
        assert_eq!(set.map_class("a.b.C").as_deref(), Some("x.y.C"));
    }

    #[test]
    fn set_hash_ignores_order() {
        let one = rules(&[("a.b", "x.y"), ("c.d", "z.w")]);
        let two = rules(&[("c.d", "z.w"), ("a.b", "x.y")]);
        assert_eq!(one.set_hash(), two.set_hash());
    }

    #[test]
    fn set_hash_is_delimited() {
        let one = rules(&[("a", "bc")]);
        let two = rules(&[("ab", "c")]);
        assert_ne!(one.set_hash(), two.set_hash());
    }

    #[test]
    fn set_hash_changes_with_rules() {
        let empty = RelocationRules::new();
        let one = rules(&[("a.b", "x.y")]);
        let two = rules(&[("a.b", "x.z")]);
        assert_ne!(empty.set_hash(), one.set_hash());
        assert_ne!(one.set_hash(), two.set_hash());
        assert_eq!(empty.set_hash().len(), 40);
    }

    #[test]
    fn extend_missing_keeps_existing() {
        let mut base = rules(&[("a.b", "x.y")]);
        base.extend_missing(&rules(&[("a.b", "ignored"), ("c.d", "z.w")]));
        assert_eq!(base.len(), 2);
        assert_eq!(base.map_class("a.b.C").as_deref(), Some("x.y.C"));
        assert_eq!(base.map_class("c.d.E").as_deref(), Some("z.w.E"));
    }
}
