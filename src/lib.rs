//! # Abide - snapshot assertions for wire-format output
//!
//! Abide records the textual form of a value (an HTTP response dump, a byte
//! stream, a serialized struct) under a stable id the first time a test runs,
//! and compares against that record on every later run.
//!
//! ## Overview
//!
//! - The first run of an assertion fails with the full candidate value, or
//!   records it when update mode is on (`ABIDE_UPDATE=1`)
//! - Later runs compare against the record and fail with a line diff on change
//! - Update mode overwrites changed records and, on a full run, prunes
//!   records no assertion touched
//!
//! Snapshots live in `__snapshots__/<group>.snapshot` under the grouping root
//! (normally the package directory) and are meant to be committed.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use abide::{AbideBuilder, Json};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let abide = AbideBuilder::from_env().build()?;
//!
//! abide.assert("plain string", "hello");
//! abide.assert("json body", &Json(vec![1, 2, 3]));
//!
//! abide.finish()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Sharing one engine across tests
//!
//! The engine is an explicit value rather than hidden global state. Test
//! suites that want one engine per binary can keep it in a `static`:
//!
//! ```rust,no_run
//! use abide::{Abide, AbideBuilder};
//! use std::sync::LazyLock;
//!
//! static ABIDE: LazyLock<Abide> =
//!     LazyLock::new(|| AbideBuilder::from_env().build().expect("open snapshots"));
//!
//! fn check_route() {
//!     ABIDE.assert("first route", "HTTP/1.1 200 OK");
//! }
//! ```
//!
//! Mutations are serialized inside the store, so assertions from parallel
//! tests are safe.
//!
//! ## Normalization
//!
//! An optional `abide.json` next to `__snapshots__` replaces volatile JSON
//! fields before values are stored or compared:
//!
//! ```json
//! { "defaults": { "updated_at": "2017-01-01T00:00:00Z" } }
//! ```
//!
//! ## Module Organization
//!
//! - [`codec`]: snapshot file format
//! - [`scanner`]: directory discovery and parallel loading
//! - [`store`]: in-memory index and grouped persistence
//! - [`config`]: normalization config
//! - [`diff`]: line diff between stored and candidate values
//! - [`assertable`]: values that can be snapshotted
//! - [`mode`]: update mode and filtered-run detection
//! - [`error`]: error types

pub mod abide;
pub mod assertable;
pub mod codec;
pub mod config;
pub mod diff;
pub mod error;
pub mod mode;
pub mod scanner;
pub mod store;
pub mod types;

// Re-export main types for convenience
pub use abide::{Abide, AbideBuilder, Assertion};
pub use assertable::{Assertable, Bytes, Debugged, Json};
pub use config::Config;
pub use diff::SnapshotDiff;
pub use error::{AbideError, Result};
pub use mode::RunMode;
pub use scanner::{LoadReport, LoadWarning};
pub use store::SnapshotStore;
pub use types::*;
