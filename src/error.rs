//! Error types for the abide library
//!
//! Infrastructure failures (locating the grouping root, creating or reading
//! the snapshot directory, writing snapshot files, parsing the config) are
//! reported through [`AbideError`]. Assertion outcomes such as a pending new
//! snapshot or a mismatch are *not* errors; they are variants of
//! [`Assertion`](crate::Assertion).

use std::path::PathBuf;
use thiserror::Error;

/// Type alias for Results in the abide library
pub type Result<T> = std::result::Result<T, AbideError>;

/// Main error type for all abide operations
#[derive(Debug, Error)]
pub enum AbideError {
    /// The grouping root (normally the working directory) could not be determined
    #[error("Unable to locate test path: {0}")]
    PathResolution(String),

    /// The snapshot directory could not be created
    #[error("Unable to create snapshot directory {path:?}: {source}")]
    DirectoryCreation {
        /// Directory that was being created
        path: PathBuf,
        /// Underlying I/O failure
        #[source]
        source: std::io::Error,
    },

    /// Permission denied while creating or writing into the snapshot directory
    #[error("Permission denied: {path:?}")]
    PermissionDenied {
        /// Path where permission was denied
        path: PathBuf,
    },

    /// The snapshot directory exists but could not be listed
    #[error("Unable to read snapshot directory {path:?}: {source}")]
    DirectoryRead {
        /// Directory that was being listed
        path: PathBuf,
        /// Underlying I/O failure
        #[source]
        source: std::io::Error,
    },

    /// A snapshot file could not be written
    #[error("Unable to write snapshot file {path:?}: {source}")]
    FileWrite {
        /// Target snapshot file
        path: PathBuf,
        /// Underlying I/O failure
        #[source]
        source: std::io::Error,
    },

    /// The normalization config exists but is malformed
    #[error("Unable to parse config {path:?}: {source}")]
    ConfigParse {
        /// Config file location
        path: PathBuf,
        /// Underlying JSON failure
        #[source]
        source: serde_json::Error,
    },

    /// The snapshot identifier cannot be stored
    #[error("Invalid snapshot id {0:?}")]
    InvalidIdentifier(String),

    /// Snapshot id not present in the index
    #[error("Snapshot not found: {0}")]
    SnapshotNotFound(String),

    /// Other I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Errors during JSON serialization/deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Thread pool error
    #[error("Thread pool error: {0}")]
    ThreadPool(String),
}

impl AbideError {
    /// Build a directory creation error, promoting permission failures to
    /// [`AbideError::PermissionDenied`].
    pub fn directory_creation(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::PermissionDenied {
            AbideError::PermissionDenied { path }
        } else {
            AbideError::DirectoryCreation { path, source }
        }
    }

    /// Build a file write error, promoting permission failures to
    /// [`AbideError::PermissionDenied`].
    pub fn file_write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::PermissionDenied {
            AbideError::PermissionDenied { path }
        } else {
            AbideError::FileWrite { path, source }
        }
    }

    /// Check if this error originates from the filesystem rather than from
    /// caller input
    pub fn is_infrastructure(&self) -> bool {
        !matches!(
            self,
            AbideError::InvalidIdentifier(_) | AbideError::SnapshotNotFound(_)
        )
    }

    /// Get a user-friendly error message with suggestions
    pub fn user_message(&self) -> String {
        match self {
            AbideError::PermissionDenied { path } => {
                format!(
                    "Permission denied for {:?}. Snapshots must be writable by the test process.",
                    path
                )
            }
            AbideError::ConfigParse { path, source } => {
                format!(
                    "Config {:?} is not valid JSON ({}). Expected {{\"defaults\": {{\"field\": value}}}}.",
                    path, source
                )
            }
            AbideError::InvalidIdentifier(id) => {
                format!(
                    "Snapshot id {:?} is invalid. Ids must be non-empty, single-line and must not contain \"*/\".",
                    id
                )
            }
            _ => self.to_string(),
        }
    }
}
