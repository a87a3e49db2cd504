//! Stowage Telemetry - Logging setup for the stowage loader.
//!
//! Every stowage crate reports through `tracing`. This crate installs the
//! subscriber that receives those events: level and per-target filtering,
//! pretty/compact/JSON/full formats, and stdout, stderr or rotating file
//! output.
//!
//! # Example
//!
//! ```rust,no_run
//! use stowage_telemetry::{LogConfig, LogFormat, setup_logging};
//!
//! # fn main() -> Result<(), stowage_telemetry::TelemetryError> {
//! let config = LogConfig::new("info")
//!     .with_format(LogFormat::Json)
//!     .with_directive("stowage_relocator=debug");
//!
//! setup_logging(&config)?;
//! tracing::info!("Logging ready");
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod prelude;

mod error;
mod logging;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::{FileRotation, LogConfig, LogFormat, LogTarget, setup_default_logging, setup_logging};
