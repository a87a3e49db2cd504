//! Environment variable fallbacks.
//!
//! Env vars are **fallback**, not override: they only fill keys the config
//! file did not set.

use std::collections::HashMap;

use tracing::debug;

use crate::error::{ConfigError, ConfigResult};

/// How an environment value becomes a TOML value.
#[derive(Debug, Clone, Copy)]
enum EnvKind {
    Path,
    /// A `STOWAGE_NO_*` flag; true turns the feature off.
    NegatedFlag,
    Count,
}

/// Mapping from environment variable name to config key.
struct EnvMapping {
    var_name: &'static str,
    key: &'static str,
    kind: EnvKind,
}

/// All supported `STOWAGE_*` env var mappings.
const ENV_MAPPINGS: &[EnvMapping] = &[
    EnvMapping {
        var_name: "STOWAGE_CACHE_DIR",
        key: "cache_dir",
        kind: EnvKind::Path,
    },
    EnvMapping {
        var_name: "STOWAGE_SCRATCH_DIR",
        key: "scratch_dir",
        kind: EnvKind::Path,
    },
    EnvMapping {
        var_name: "STOWAGE_NO_PRUNE",
        key: "prune",
        kind: EnvKind::NegatedFlag,
    },
    EnvMapping {
        var_name: "STOWAGE_NO_RELOCATE",
        key: "relocate",
        kind: EnvKind::NegatedFlag,
    },
    EnvMapping {
        var_name: "STOWAGE_NO_PROGRESS",
        key: "progress",
        kind: EnvKind::NegatedFlag,
    },
    EnvMapping {
        var_name: "STOWAGE_WORKERS",
        key: "workers",
        kind: EnvKind::Count,
    },
];

/// Collect the `STOWAGE_*` variables from the process environment.
#[must_use]
pub fn collect_env_vars() -> HashMap<String, String> {
    std::env::vars()
        .filter(|(k, _)| k.starts_with("STOWAGE_"))
        .collect()
}

/// Apply environment variable fallbacks to keys missing from `table`.
///
/// Returns the number of env vars applied.
///
/// # Errors
///
/// Returns [`ConfigError::EnvError`] if a variable cannot be interpreted.
pub fn apply_env_fallbacks<S: ::std::hash::BuildHasher>(
    table: &mut toml::Table,
    env_vars: &HashMap<String, String, S>,
) -> ConfigResult<usize> {
    let mut count: usize = 0;

    for mapping in ENV_MAPPINGS {
        if table.contains_key(mapping.key) {
            continue;
        }
        let Some(raw) = env_vars.get(mapping.var_name) else {
            continue;
        };

        debug!(
            var = mapping.var_name,
            field = mapping.key,
            "applying env var fallback"
        );
        let value = convert(mapping, raw)?;
        table.insert(mapping.key.to_owned(), value);
        count = count.saturating_add(1);
    }

    Ok(count)
}

fn convert(mapping: &EnvMapping, raw: &str) -> ConfigResult<toml::Value> {
    let error = |message: String| ConfigError::EnvError {
        var_name: mapping.var_name.to_owned(),
        message,
    };
    let raw = raw.trim();
    match mapping.kind {
        EnvKind::Path => Ok(toml::Value::String(raw.to_owned())),
        EnvKind::NegatedFlag => parse_flag(raw)
            .map(|set| toml::Value::Boolean(!set))
            .ok_or_else(|| error(format!("expected a boolean, got '{raw}'"))),
        EnvKind::Count => raw
            .parse::<i64>()
            .ok()
            .filter(|n| *n >= 0)
            .map(toml::Value::Integer)
            .ok_or_else(|| error(format!("expected a non-negative integer, got '{raw}'"))),
    }
}

/// Parse common boolean spellings. An empty value counts as set.
fn parse_flag(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "" | "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
