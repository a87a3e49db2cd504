//! Stowage Resolver - fetches, verifies and relocates declared dependencies.
//!
//! Given a [`Manifest`](stowage_core::Manifest) and a cache root, the
//! [`Resolver`] makes sure every declared dependency is present in the cache
//! in relocated form, next to a sidecar recording the stored archive's hash.
//!
//! # Trust Chain
//!
//! For each dependency and each repository, in declared order:
//!
//! 1. The repository's `.sha1` file must match the hash in the manifest.
//!    This check happens before any archive bytes are transferred.
//! 2. The downloaded bytes must hash to that same value.
//! 3. The archive is relocated into a temp file beside its final path and
//!    renamed into place, then its sidecar is written the same way.
//!
//! A cached archive is reused only while it still hashes to its sidecar.
//! Anything else under the cache root is pruned after a successful pass.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod cache;
pub mod error;
pub mod progress;
mod resolver;
pub mod transport;

pub use cache::{PruneStats, clear_directory, prune};
pub use error::{RepositoryAttempt, ResolveError, ResolveResult};
pub use progress::{DEFAULT_PROGRESS_INTERVAL, ProgressNotifier, ProgressSnapshot};
pub use resolver::{ResolvedDependency, ResolvedSet, Resolver, ResolverOptions, default_workers};
pub use transport::{DEFAULT_CONNECT_TIMEOUT, HttpTransport};
