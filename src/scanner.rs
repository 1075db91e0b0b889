//! Snapshot directory discovery and parallel loading
//!
//! The scanner locates (and lazily creates) the `__snapshots__` directory of
//! a grouping root and builds the in-memory index from every `.snapshot`
//! file it contains.
//!
//! ## Loading
//!
//! Files are read and decoded in parallel on a bounded rayon pool, one task
//! per file. Each task merges its records into the shared index under a
//! single mutex that is held only for the merge itself, never for I/O.
//!
//! Loading is best effort: a file that cannot be read contributes no records
//! and is reported as a [`LoadWarning`] rather than failing the load. Only a
//! directory that cannot be listed is an error.
//!
//! ## Duplicate ids
//!
//! When two files define the same id the record from the file whose path
//! sorts first is kept, regardless of which task finished first, and a
//! [`LoadWarning::DuplicateId`] is recorded.

use crate::codec;
use crate::error::{AbideError, Result};
use crate::types::{Snapshot, SnapshotId, SNAPSHOTS_DIR, SNAPSHOT_EXT};
use parking_lot::Mutex;
use rayon::prelude::*;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Something that went wrong while loading, without aborting the load
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum LoadWarning {
    /// The file could not be read and contributed no records
    Unreadable {
        /// Snapshot file
        path: PathBuf,
        /// Reason reported by the filesystem
        reason: String,
    },
    /// Two files define the same id
    DuplicateId {
        /// Conflicting id
        id: SnapshotId,
        /// File whose record was kept
        kept: PathBuf,
        /// File whose record was ignored
        ignored: PathBuf,
    },
    /// A chunk of the file could not be parsed and was dropped
    DiscardedChunk {
        /// Snapshot file
        path: PathBuf,
        /// First line of the dropped chunk
        preview: String,
    },
}

impl fmt::Display for LoadWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadWarning::Unreadable { path, reason } => {
                write!(f, "unreadable snapshot file {}: {}", path.display(), reason)
            }
            LoadWarning::DuplicateId { id, kept, ignored } => write!(
                f,
                "snapshot `{}` defined in both {} and {}, keeping the former",
                id,
                kept.display(),
                ignored.display()
            ),
            LoadWarning::DiscardedChunk { path, preview } => {
                write!(f, "discarded malformed entry in {}: {:?}", path.display(), preview)
            }
        }
    }
}

/// Merged result of loading a snapshot directory
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    /// Every record, tagged with the file it came from
    pub snapshots: HashMap<SnapshotId, Snapshot>,
    /// Every snapshot file that was found, sorted
    pub files: Vec<PathBuf>,
    /// Problems that did not abort the load, sorted
    pub warnings: Vec<LoadWarning>,
}

impl LoadReport {
    /// Check if the load completed without any warnings
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

/// Return the snapshot directory under `root`, creating it if missing
///
/// # Errors
///
/// - [`AbideError::PermissionDenied`] if the directory cannot be created for lack of permissions
/// - [`AbideError::DirectoryCreation`] for any other creation failure, including
///   a non-directory already occupying the path
pub fn ensure_directory(root: &Path) -> Result<PathBuf> {
    let dir = root.join(SNAPSHOTS_DIR);

    match fs::metadata(&dir) {
        Ok(meta) if meta.is_dir() => return Ok(dir),
        Ok(_) => {
            let source = std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                "path exists and is not a directory",
            );
            return Err(AbideError::directory_creation(dir, source));
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(AbideError::directory_creation(dir, e)),
    }

    fs::create_dir_all(&dir).map_err(|e| AbideError::directory_creation(&dir, e))?;
    debug!("Created snapshot directory {:?}", dir);
    Ok(dir)
}

/// List the snapshot files directly inside `dir`, sorted by path
pub fn snapshot_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|e| AbideError::DirectoryRead {
        path: dir.to_path_buf(),
        source: e,
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| AbideError::DirectoryRead {
            path: dir.to_path_buf(),
            source: e,
        })?;
        let path = entry.path();
        if path.is_file() && is_snapshot_file(&path) {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}

/// Returns true if the given path has the snapshot extension
pub fn is_snapshot_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == SNAPSHOT_EXT)
}

/// Load and merge every snapshot file in `dir`
///
/// `workers` bounds the number of files parsed at the same time.
///
/// # Errors
///
/// - [`AbideError::DirectoryRead`] if the directory cannot be listed
/// - [`AbideError::ThreadPool`] if the worker pool cannot be created
#[instrument(skip(dir), fields(dir = %dir.display()))]
pub fn load_all(dir: &Path, workers: usize) -> Result<LoadReport> {
    let start = Instant::now();
    let files = snapshot_files(dir)?;

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.clamp(1, files.len().max(1)))
        .build()
        .map_err(|e| AbideError::ThreadPool(e.to_string()))?;

    let merged = Mutex::new(LoadReport::default());

    pool.install(|| {
        files.par_iter().for_each(|path| {
            let parsed = fs::read(path).map(|data| codec::decode_with_report(&data));

            let mut report = merged.lock();
            match parsed {
                Ok(decoded) => {
                    debug!(
                        "Parsed {} snapshots from {:?}",
                        decoded.snapshots.len(),
                        path
                    );
                    for preview in decoded.discarded {
                        report.warnings.push(LoadWarning::DiscardedChunk {
                            path: path.clone(),
                            preview,
                        });
                    }
                    for (id, snapshot) in decoded.snapshots {
                        merge(&mut report, id, snapshot.with_path(path.clone()));
                    }
                }
                Err(e) => {
                    report.warnings.push(LoadWarning::Unreadable {
                        path: path.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        });
    });

    let mut report = merged.into_inner();
    report.files = files;
    report.warnings.sort();

    for warning in &report.warnings {
        warn!("{}", warning);
    }

    info!(
        "Loaded {} snapshots from {} files in {:?}",
        report.snapshots.len(),
        report.files.len(),
        start.elapsed()
    );

    Ok(report)
}

/// Insert a record, keeping the one from the lowest path on conflict
fn merge(report: &mut LoadReport, id: SnapshotId, snapshot: Snapshot) {
    let Some(existing) = report.snapshots.get(&id) else {
        report.snapshots.insert(id, snapshot);
        return;
    };

    let (existing_path, new_path) = match (&existing.path, &snapshot.path) {
        (Some(a), Some(b)) => (a.clone(), b.clone()),
        _ => return,
    };

    if new_path < existing_path {
        report.warnings.push(LoadWarning::DuplicateId {
            id: id.clone(),
            kept: new_path,
            ignored: existing_path,
        });
        report.snapshots.insert(id, snapshot);
    } else {
        report.warnings.push(LoadWarning::DuplicateId {
            id,
            kept: existing_path,
            ignored: new_path,
        });
    }
}
