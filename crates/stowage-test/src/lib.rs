//! Stowage Test - Shared test utilities for the stowage crates.
//!
//! This crate provides builders and fakes that can be used across the
//! stowage crates as a dev-dependency:
//!
//! - [`ClassFileBuilder`] / [`ClassFileView`]: write and inspect minimal
//!   class files
//! - [`JarBuilder`] / [`read_jar`]: assemble archives in memory and read them
//!   back
//! - [`MockRepository`]: a fake Maven repository over HTTP
//! - [`fixtures`]: manifest JSON and directory helpers
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! stowage-test.workspace = true
//! ```
//!
//! ```rust,ignore
//! use stowage_test::{JarBuilder, MockRepository};
//!
//! #[tokio::test]
//! async fn resolves_from_mock() {
//!     let repo = MockRepository::start().await;
//!     let jar = JarBuilder::new().entry("a/b/data.txt", b"hi").build();
//!     let dep = repo.publish("org.example", "widget", "1.0", None, &jar).await;
//!     // ...
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod classfile;
pub mod fixtures;
pub mod jar;
pub mod repository;

pub use classfile::{ClassFileBuilder, ClassFileView};
pub use fixtures::*;
pub use jar::{JarBuilder, jar_entry, jar_entry_names, read_jar, read_jar_bytes};
pub use repository::MockRepository;
