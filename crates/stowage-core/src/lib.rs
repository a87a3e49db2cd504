//! Stowage Core - the data model shared by every stowage crate.
//!
//! This crate provides:
//!
//! - [`Manifest`]: repositories, dependency declarations and relocation rules,
//!   decoded from the JSON manifest embedded in a bootstrapped archive
//! - [`Dependency`]: an immutable Maven coordinate plus the SHA-1 of the
//!   upstream artifact
//! - [`RelocationRules`]: ordered package-prefix rewrite rules and their
//!   order-independent set hash
//! - [`CacheSlot`] / [`compute_dependency_path`]: deterministic cache
//!   addressing
//! - [`hash`]: SHA-1 helpers used for sidecars and transfer verification
//!
//! # Cache Addressing
//!
//! A dependency lives at
//! `cache_root/group/artifact/versionWithClassifier/<sha1>-<rulesHash>.jar`
//! with a `.sha1` sidecar beside it. The path embeds both the upstream hash
//! and the relocation set hash, so differently relocated variants of the same
//! artifact never share a slot.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod cache;
pub mod dependency;
pub mod error;
pub mod hash;
pub mod manifest;
pub mod relocation;

pub use cache::{CacheSlot, SIDECAR_EXTENSION, compute_dependency_path, sidecar_path};
pub use dependency::Dependency;
pub use error::{ManifestError, ManifestResult};
pub use manifest::Manifest;
pub use relocation::{Relocation, RelocationRules};
