//! Config file loading.
//!
//! Implements the `load()` algorithm:
//! 1. Read the config file, if one is given
//! 2. Apply `STOWAGE_*` env var fallbacks for keys the file did not set
//! 3. Deserialize into [`LoaderConfig`], defaulting every missing key
//! 4. Fill unset directories from the platform cache location
//! 5. Validate

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::env::{apply_env_fallbacks, collect_env_vars};
use crate::error::{ConfigError, ConfigResult};
use crate::types::LoaderConfig;
use crate::validate;

/// Maximum allowed config file size (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1_048_576;

/// Load configuration from an optional file plus the process environment.
///
/// # Errors
///
/// Returns a [`ConfigError`] if the file cannot be read or parsed, an env
/// var is malformed, or the result fails validation.
pub fn load(path: Option<&Path>) -> ConfigResult<LoaderConfig> {
    load_with_env(path, &collect_env_vars())
}

/// [`load`] with an explicit environment.
///
/// # Errors
///
/// See [`load`].
pub fn load_with_env<S: ::std::hash::BuildHasher>(
    path: Option<&Path>,
    env_vars: &HashMap<String, String, S>,
) -> ConfigResult<LoaderConfig> {
    let (mut table, origin) = match path {
        Some(path) => {
            let table = read_table(path)?;
            info!(path = %path.display(), "loaded loader config");
            (table, path.display().to_string())
        },
        None => (toml::Table::new(), "<environment>".to_owned()),
    };

    let env_count = apply_env_fallbacks(&mut table, env_vars)?;
    if env_count > 0 {
        debug!(count = env_count, "applied environment variable fallbacks");
    }

    let mut config = deserialize(table, &origin)?;
    if !config.has_directories() {
        let (cache, scratch) = default_directories()?;
        config.fill_directories(cache, scratch);
    }

    validate::validate(&config)?;
    Ok(config)
}

/// Load a config from a specific file path, without environment fallbacks
/// or platform directory defaults.
///
/// # Errors
///
/// Returns a [`ConfigError`] if the file cannot be read, parsed, or fails
/// validation.
pub fn load_file(path: &Path) -> ConfigResult<LoaderConfig> {
    let table = read_table(path)?;
    let config = deserialize(table, &path.display().to_string())?;
    validate::validate(&config)?;
    Ok(config)
}

/// Platform cache and scratch directories for the loader.
///
/// # Errors
///
/// Returns [`ConfigError::NoCacheDir`] if the platform has no cache
/// location for the current user.
pub fn default_directories() -> ConfigResult<(PathBuf, PathBuf)> {
    let dirs = directories::ProjectDirs::from("", "", "stowage").ok_or(ConfigError::NoCacheDir)?;
    let base = dirs.cache_dir();
    Ok((base.join("artifacts"), base.join("scratch")))
}

fn read_table(path: &Path) -> ConfigResult<toml::Table> {
    // Check file size before reading to prevent OOM.
    let metadata = std::fs::metadata(path).map_err(|e| ConfigError::ReadError {
        path: path.display().to_string(),
        source: e,
    })?;
    if metadata.len() > MAX_CONFIG_FILE_SIZE {
        return Err(ConfigError::ValidationError {
            field: path.display().to_string(),
            message: format!(
                "config file is {} bytes, exceeding the {} byte limit",
                metadata.len(),
                MAX_CONFIG_FILE_SIZE
            ),
        });
    }

    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.display().to_string(),
        source: e,
    })?;
    toml::from_str(&content).map_err(|e| ConfigError::ParseError {
        path: path.display().to_string(),
        source: e,
    })
}

fn deserialize(table: toml::Table, origin: &str) -> ConfigResult<LoaderConfig> {
    toml::Value::Table(table)
        .try_into()
        .map_err(|e: toml::de::Error| ConfigError::ParseError {
            path: origin.to_owned(),
            source: e,
        })
}
