#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
//! Configuration for the stowage loader.
//!
//! This crate provides [`LoaderConfig`], the one immutable value the loader
//! is built from: cache and scratch directories, pruning, relocation and
//! progress flags, extra relocation rules, worker count and timeouts.
//!
//! # Usage
//!
//! ```rust,no_run
//! use stowage_config::LoaderConfig;
//!
//! // In code:
//! let config = LoaderConfig::new("/var/cache/app/libs", "/var/cache/app/scratch")
//!     .with_prune(false)
//!     .with_relocation("com.google.gson", "app.libs.gson");
//!
//! // Or from a file, with `STOWAGE_*` fallbacks:
//! let config = LoaderConfig::load(Some(std::path::Path::new("stowage.toml"))).unwrap();
//! println!("cache: {}", config.cache_dir().display());
//! ```
//!
//! # Environment
//!
//! `STOWAGE_CACHE_DIR`, `STOWAGE_SCRATCH_DIR`, `STOWAGE_NO_PRUNE`,
//! `STOWAGE_NO_RELOCATE`, `STOWAGE_NO_PROGRESS` and `STOWAGE_WORKERS` fill
//! keys the file leaves unset. They never override the file.

/// Environment variable fallback resolution.
pub mod env;
/// Configuration error types.
pub mod error;
/// Configuration file loading.
pub mod loader;
/// Configuration struct definitions.
pub mod types;
/// Configuration validation rules.
pub mod validate;

// Re-export primary types at the crate root.
pub use error::{ConfigError, ConfigResult};
pub use types::*;

impl LoaderConfig {
    /// Load configuration from an optional TOML file plus environment
    /// fallbacks. See [`loader::load`].
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the file is malformed or the result
    /// fails validation.
    pub fn load(path: Option<&std::path::Path>) -> ConfigResult<Self> {
        loader::load(path)
    }

    /// Load configuration from a single file, without fallbacks.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the file cannot be read, parsed, or fails
    /// validation.
    pub fn load_file(path: &std::path::Path) -> ConfigResult<Self> {
        loader::load_file(path)
    }

    /// Check this configuration. See [`validate::validate`].
    ///
    /// # Errors
    ///
    /// Returns the first validation error found.
    pub fn validate(&self) -> ConfigResult<()> {
        validate::validate(self)
    }
}
