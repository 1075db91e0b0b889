//! Core data types used throughout the abide library
//!
//! ## Overview
//!
//! - **Records**: [`SnapshotId`], [`Snapshot`] - a captured value under a stable id
//! - **Layout**: [`SNAPSHOTS_DIR`], [`SNAPSHOT_EXT`], [`CONFIG_FILE`] - on-disk conventions
//! - **Reports**: [`PruneReport`] - result of suite teardown
//!
//! ## Examples
//!
//! ```rust
//! use abide::types::{Snapshot, SnapshotId};
//!
//! let snapshot = Snapshot::new("greeting", "hello");
//! assert_eq!(snapshot.id, SnapshotId::from("greeting"));
//! assert!(snapshot.path.is_none());
//! ```

use crate::codec::{HEADER_TERMINATOR, SEPARATOR};
use crate::error::{AbideError, Result};
use std::borrow::Borrow;
use std::fmt;
use std::path::PathBuf;

/// Name of the directory holding snapshot files, relative to the grouping root
pub const SNAPSHOTS_DIR: &str = "__snapshots__";

/// Extension (without the dot) of snapshot files
pub const SNAPSHOT_EXT: &str = "snapshot";

/// Name of the optional normalization config, relative to the grouping root
pub const CONFIG_FILE: &str = "abide.json";

/// Unique identifier for a snapshot
///
/// Ids are chosen by the test author and are unique within the whole index.
/// Any string is accepted as long as it can be written into a snapshot file
/// header and read back unchanged.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SnapshotId(String);

impl SnapshotId {
    /// Create a new id without validating it
    pub fn new(id: impl Into<String>) -> Self {
        SnapshotId(id.into())
    }

    /// Borrow the id as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check that the id survives an encode/decode cycle
    ///
    /// # Errors
    ///
    /// [`AbideError::InvalidIdentifier`] if the id is empty or whitespace,
    /// spans several lines, has surrounding whitespace, or contains the record
    /// separator or the header terminator.
    pub fn validate(&self) -> Result<()> {
        let id = self.0.as_str();
        let malformed = id.trim().is_empty()
            || id.trim() != id
            || id.contains('\n')
            || id.contains('\r')
            || id.contains(SEPARATOR.trim_end())
            || id.contains(HEADER_TERMINATOR.trim());
        if malformed {
            return Err(AbideError::InvalidIdentifier(self.0.clone()));
        }
        Ok(())
    }

    /// Whether the id is valid, see [`SnapshotId::validate`]
    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SnapshotId {
    fn from(id: &str) -> Self {
        SnapshotId(id.to_string())
    }
}

impl From<String> for SnapshotId {
    fn from(id: String) -> Self {
        SnapshotId(id)
    }
}

impl Borrow<str> for SnapshotId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// A captured value identified by a [`SnapshotId`]
///
/// `seen` and `marked_for_removal` are transient and never persisted. They
/// start out `false` every time the index is loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Unique identifier
    pub id: SnapshotId,
    /// Captured representation
    pub value: String,
    /// File this record was loaded from or will be written to
    pub path: Option<PathBuf>,
    /// Whether the current run compared or created this record
    pub seen: bool,
    /// Set while pruning decides which records to drop
    pub marked_for_removal: bool,
}

impl Snapshot {
    /// Create an unsaved, unseen snapshot
    pub fn new(id: impl Into<SnapshotId>, value: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            value: value.into(),
            path: None,
            seen: false,
            marked_for_removal: false,
        }
    }

    /// Attach the file this snapshot belongs to
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }
}

/// Result of the teardown step
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneReport {
    /// Whether pruning was active for this run
    pub pruned: bool,
    /// Ids dropped because no assertion touched them
    pub removed: Vec<SnapshotId>,
    /// Snapshot files deleted because every record in them was dropped
    pub files_deleted: Vec<PathBuf>,
}

impl PruneReport {
    /// Check if anything was removed
    pub fn has_removals(&self) -> bool {
        !self.removed.is_empty()
    }
}
