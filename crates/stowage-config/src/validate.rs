//! Configuration validation.
//!
//! Validates that a [`LoaderConfig`](crate::LoaderConfig) is usable and that
//! cross-field invariants hold.

use std::path::{Component, Path, PathBuf};

use crate::error::{ConfigError, ConfigResult};
use crate::types::LoaderConfig;

/// Upper bound on resolver workers.
const MAX_WORKERS: usize = 256;

/// Validate a configuration.
///
/// # Errors
///
/// Returns the first validation error found.
pub fn validate(config: &LoaderConfig) -> ConfigResult<()> {
    validate_directories(config)?;
    validate_limits(config)?;
    validate_manifest_resource(config)?;
    config.relocation_rules()?;
    Ok(())
}

fn validate_directories(config: &LoaderConfig) -> ConfigResult<()> {
    for (field, dir) in [
        ("cache_dir", config.cache_dir()),
        ("scratch_dir", config.scratch_dir()),
    ] {
        if dir.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError {
                field: field.to_owned(),
                message: "directory must not be empty".to_owned(),
            });
        }
    }

    // Pruning walks the cache root and startup clears scratch, so neither
    // may contain the other.
    let cache = normalize(config.cache_dir());
    let scratch = normalize(config.scratch_dir());
    if cache.starts_with(&scratch) || scratch.starts_with(&cache) {
        return Err(ConfigError::ValidationError {
            field: "scratch_dir".to_owned(),
            message: format!(
                "scratch directory {} must not overlap cache directory {}",
                config.scratch_dir().display(),
                config.cache_dir().display()
            ),
        });
    }
    Ok(())
}

fn validate_limits(config: &LoaderConfig) -> ConfigResult<()> {
    if let Some(workers) = config.workers() {
        if workers == 0 || workers > MAX_WORKERS {
            return Err(ConfigError::ValidationError {
                field: "workers".to_owned(),
                message: format!("workers must be between 1 and {MAX_WORKERS}"),
            });
        }
    }

    if config.connect_timeout().is_zero() {
        return Err(ConfigError::ValidationError {
            field: "connect_timeout_secs".to_owned(),
            message: "connect timeout must be at least one second".to_owned(),
        });
    }

    if config.progress_interval().is_zero() {
        return Err(ConfigError::ValidationError {
            field: "progress_interval_ms".to_owned(),
            message: "progress interval must be positive".to_owned(),
        });
    }
    Ok(())
}

fn validate_manifest_resource(config: &LoaderConfig) -> ConfigResult<()> {
    let name = config.manifest_resource();
    if name.is_empty() || name.starts_with('/') || name.ends_with('/') {
        return Err(ConfigError::ValidationError {
            field: "manifest_resource".to_owned(),
            message: format!("'{name}' is not a valid archive entry name"),
        });
    }
    Ok(())
}

/// Lexically normalize a path: drop `.` components and fold `..`.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {},
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            },
            other => out.push(other),
        }
    }
    out
}
