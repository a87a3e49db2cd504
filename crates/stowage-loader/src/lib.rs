//! Stowage Loader - runtime dependencies for self-describing archives.
//!
//! An archive declares its dependencies in an embedded manifest instead of
//! bundling them. At first run this crate:
//!
//! 1. resolves every declared dependency into a content-addressed cache,
//!    verifying hashes and relocating packages ([`Loader::prepare`])
//! 2. composes the resolved archives into a child-first [`IsolatedScope`]
//!    layered over a host-supplied parent scope
//!    ([`Loader::create_isolated_scope`])
//! 3. optionally drives a host-constructed instance through its
//!    [`Lifecycle`] ([`Bootstrap`])
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use stowage_config::LoaderConfig;
//! use stowage_loader::{Bootstrap, EmptyScope};
//!
//! let config = LoaderConfig::load(None)?;
//! let mut bootstrap = Bootstrap::new(config, "plugins/my-plugin.jar")?;
//! bootstrap
//!     .load(Arc::new(EmptyScope), |scope| Ok(Box::new(MyPlugin::new(scope))))
//!     .await?;
//! bootstrap.enable()?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod bootstrap;
pub mod error;
mod loader;
pub mod scope;

pub use bootstrap::{Bootstrap, Lifecycle, LifecycleState, install_logging, read_embedded_manifest};
pub use error::{HostError, LoaderError, LoaderResult};
pub use loader::{Loader, resolver_options};
pub use scope::{
    ArchiveScope, EmptyScope, IsolatedScope, ResourceRef, Scope, class_entry_name,
    service_providers,
};

pub use stowage_config::LoaderConfig;
pub use stowage_core::{Dependency, Manifest, RelocationRules};
pub use stowage_resolver::{ResolvedDependency, ResolvedSet};
