//! Stowage Relocator - renames packages inside jar archives.
//!
//! Bundled dependencies are relocated so their classes cannot collide with
//! same-named classes already loaded by the host process. Relocation renames
//! package prefixes throughout an archive:
//!
//! - class files: every symbolic reference in the constant pool, plus the
//!   entry's own path
//! - service registrations: file names and listed providers, merging files
//!   that collide after renaming
//! - resources under a relocated package directory
//!
//! # Example
//!
//! ```rust,ignore
//! use stowage_core::RelocationRules;
//! use stowage_relocator::JarRelocator;
//!
//! let rules = RelocationRules::from_pairs([("com.google.gson", "my.app.libs.gson")])?;
//! let stats = JarRelocator::new("gson.jar", "gson-relocated.jar", rules).run()?;
//! println!("rewrote {} classes", stats.classes_rewritten);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod classfile;
pub mod error;
mod jar;
mod names;
mod services;

pub use classfile::relocate_class;
pub use error::{ClassFormatError, RelocationError, RelocationResult};
pub use jar::{JarRelocator, RelocationStats, relocate};
