//! In-memory snapshot index with grouped persistence
//!
//! [`SnapshotStore`] owns every record known to the current run. It is built
//! once from the snapshot directory, mutated while assertions execute, and
//! written back file by file.
//!
//! ## Persistence
//!
//! Records are grouped by the file they belong to and every group is written
//! with a whole-file replace: the new content goes to a temporary file in the
//! same directory which is then renamed over the target. Only files whose
//! records changed since the last save are written, and records without a
//! path are never written. A file whose records have all been removed is
//! deleted.
//!
//! Files that contributed no records at load (unreadable, malformed, or
//! holding only ids that lost a duplicate tie-break) are never touched.
//!
//! ## Thread Safety
//!
//! The index lives behind a single `RwLock`. Lookups share the read lock;
//! every mutation, including the save that follows it, holds the write lock
//! for its whole duration, so concurrent assertions cannot lose updates or
//! interleave file writes.

use crate::codec;
use crate::error::{AbideError, Result};
use crate::scanner::{self, LoadReport, LoadWarning};
use crate::types::{PruneReport, Snapshot, SnapshotId, SNAPSHOT_EXT};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, trace};

/// Process-wide collection of snapshots for one grouping root
pub struct SnapshotStore {
    /// Snapshot directory
    dir: PathBuf,
    /// Grouping name, used to name the file new records go to
    group: String,
    /// Records and the files they came from
    state: RwLock<StoreState>,
    /// Problems found while loading
    warnings: Vec<LoadWarning>,
}

#[derive(Default)]
struct StoreState {
    snapshots: HashMap<SnapshotId, Snapshot>,
    /// Files that held at least one record when loaded or last written
    files: BTreeSet<PathBuf>,
    /// Files whose records changed since the last save
    dirty: BTreeSet<PathBuf>,
}

impl StoreState {
    fn touch(&mut self, path: Option<&PathBuf>) {
        if let Some(path) = path {
            self.dirty.insert(path.clone());
        }
    }
}

impl std::fmt::Debug for SnapshotStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("SnapshotStore")
            .field("dir", &self.dir)
            .field("group", &self.group)
            .field("snapshots", &state.snapshots.len())
            .field("files", &state.files.len())
            .field("dirty", &state.dirty.len())
            .field("warnings", &self.warnings.len())
            .finish()
    }
}

impl SnapshotStore {
    /// Open the store for a grouping root
    ///
    /// Creates `<root>/__snapshots__` if needed and loads every snapshot file
    /// in it using at most `workers` parallel tasks.
    ///
    /// # Errors
    ///
    /// - [`AbideError::PermissionDenied`] / [`AbideError::DirectoryCreation`] if the
    ///   snapshot directory cannot be created
    /// - [`AbideError::DirectoryRead`] if it cannot be listed
    #[instrument(skip(root, group), fields(root = %root.display()))]
    pub fn open(root: &Path, group: impl Into<String>, workers: usize) -> Result<Self> {
        let dir = scanner::ensure_directory(root)?;
        let report = scanner::load_all(&dir, workers)?;
        Ok(Self::from_report(dir, group, report))
    }

    /// Build a store from an already loaded directory
    pub fn from_report(dir: PathBuf, group: impl Into<String>, report: LoadReport) -> Self {
        let files = report
            .snapshots
            .values()
            .filter_map(|s| s.path.clone())
            .collect();
        let state = StoreState {
            snapshots: report.snapshots,
            files,
            dirty: BTreeSet::new(),
        };

        Self {
            dir,
            group: group.into(),
            state: RwLock::new(state),
            warnings: report.warnings,
        }
    }

    /// Snapshot directory this store reads from and writes to
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File that newly created records are written to
    pub fn group_path(&self) -> PathBuf {
        self.dir.join(format!("{}.{}", self.group, SNAPSHOT_EXT))
    }

    /// Problems found while loading the directory
    pub fn warnings(&self) -> &[LoadWarning] {
        &self.warnings
    }

    /// Look up a record by id
    pub fn get(&self, id: &str) -> Option<Snapshot> {
        self.state.read().snapshots.get(id).cloned()
    }

    /// Number of records in the index
    pub fn len(&self) -> usize {
        self.state.read().snapshots.len()
    }

    /// Check if the index holds no records
    pub fn is_empty(&self) -> bool {
        self.state.read().snapshots.is_empty()
    }

    /// All ids, sorted
    pub fn ids(&self) -> Vec<SnapshotId> {
        let mut ids: Vec<SnapshotId> = self.state.read().snapshots.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// All records, sorted by id
    pub fn snapshots(&self) -> Vec<Snapshot> {
        let mut all: Vec<Snapshot> = self.state.read().snapshots.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    /// Create or overwrite a record and persist the whole index
    ///
    /// The record is assigned to this store's group file. Transient flags of
    /// an existing record are kept.
    ///
    /// # Errors
    ///
    /// - [`AbideError::InvalidIdentifier`] if the id cannot be stored
    /// - any error from [`SnapshotStore::save`]
    pub fn create_or_update(
        &self,
        id: impl Into<SnapshotId>,
        value: impl Into<String>,
    ) -> Result<Snapshot> {
        let id = id.into();
        id.validate()?;

        let path = self.group_path();
        let mut state = self.state.write();

        let previous = state.snapshots.get(&id).and_then(|s| s.path.clone());
        state.touch(previous.as_ref());
        state.touch(Some(&path));

        let snapshot = match state.snapshots.get(&id) {
            Some(existing) => Snapshot {
                value: value.into(),
                path: Some(path),
                ..existing.clone()
            },
            None => Snapshot::new(id.clone(), value).with_path(path),
        };

        debug!("Storing snapshot `{}`", id);
        state.snapshots.insert(id, snapshot.clone());
        save_locked(&mut state)?;

        Ok(snapshot)
    }

    /// Apply `mutator` to a record in place
    ///
    /// Returns the updated record, or `None` if the id is unknown. Changes
    /// are not persisted until the next save.
    pub fn update<F>(&self, id: &str, mutator: F) -> Option<Snapshot>
    where
        F: FnOnce(&mut Snapshot),
    {
        let mut state = self.state.write();
        let snapshot = state.snapshots.get_mut(id)?;
        let before = (snapshot.value.clone(), snapshot.path.clone());
        mutator(snapshot);
        let updated = snapshot.clone();

        if (&updated.value, &updated.path) != (&before.0, &before.1) {
            state.touch(before.1.as_ref());
            state.touch(updated.path.as_ref());
        }
        Some(updated)
    }

    /// Flag a record as touched by the current run
    pub fn mark_seen(&self, id: &str) -> bool {
        let mut state = self.state.write();
        match state.snapshots.get_mut(id) {
            Some(snapshot) => {
                snapshot.seen = true;
                true
            }
            None => false,
        }
    }

    /// Remove a record and persist the index
    pub fn remove(&self, id: &str) -> Result<Option<Snapshot>> {
        let mut state = self.state.write();
        let removed = state.snapshots.remove(id);
        if let Some(snapshot) = &removed {
            state.touch(snapshot.path.as_ref());
            save_locked(&mut state)?;
        }
        Ok(removed)
    }

    /// Write back every file whose records changed since the last save
    ///
    /// # Errors
    ///
    /// [`AbideError::FileWrite`] / [`AbideError::PermissionDenied`] if a file
    /// cannot be replaced. Files written before the failure keep their new
    /// content.
    pub fn save(&self) -> Result<()> {
        let mut state = self.state.write();
        save_locked(&mut state).map(|_| ())
    }

    /// Drop every record that was not seen during this run, then save
    ///
    /// Does nothing when `should_prune` is false. Callers must only enable it
    /// for a full run in update mode: in a filtered run, records belonging to
    /// tests that did not execute would be lost.
    #[instrument(skip(self))]
    pub fn prune(&self, should_prune: bool) -> Result<PruneReport> {
        if !should_prune {
            return Ok(PruneReport::default());
        }

        let mut state = self.state.write();
        for snapshot in state.snapshots.values_mut() {
            snapshot.marked_for_removal = !snapshot.seen;
        }

        let stale: Vec<(SnapshotId, Option<PathBuf>)> = state
            .snapshots
            .values()
            .filter(|s| s.marked_for_removal)
            .map(|s| (s.id.clone(), s.path.clone()))
            .collect();
        for (_, path) in &stale {
            state.touch(path.as_ref());
        }
        let mut removed: Vec<SnapshotId> = stale.into_iter().map(|(id, _)| id).collect();
        removed.sort();

        state.snapshots.retain(|_, s| !s.marked_for_removal);
        let files_deleted = save_locked(&mut state)?;

        info!("Pruned {} unused snapshots", removed.len());

        Ok(PruneReport {
            pruned: true,
            removed,
            files_deleted,
        })
    }

    /// Teardown: prune if requested, then save
    pub fn close(self, should_prune: bool) -> Result<PruneReport> {
        let report = self.prune(should_prune)?;
        self.save()?;
        Ok(report)
    }
}

/// Rewrite every dirty file from its records. Returns deleted files.
fn save_locked(state: &mut StoreState) -> Result<Vec<PathBuf>> {
    let mut groups: BTreeMap<&Path, Vec<&Snapshot>> = BTreeMap::new();
    for snapshot in state.snapshots.values() {
        match &snapshot.path {
            Some(path) => groups.entry(path.as_path()).or_default().push(snapshot),
            None => trace!("Skipping unsaved snapshot `{}`", snapshot.id),
        }
    }

    let mut written = Vec::new();
    let mut deleted = Vec::new();
    for path in &state.dirty {
        match groups.get(path.as_path()) {
            Some(snapshots) => {
                let data = codec::encode(snapshots.iter().copied());
                write_if_changed(path, &data)?;
                written.push(path.clone());
            }
            // Only files that held records are ours to delete
            None if state.files.contains(path) => match fs::remove_file(path) {
                Ok(()) => {
                    debug!("Removed empty snapshot file {:?}", path);
                    deleted.push(path.clone());
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(AbideError::file_write(path.clone(), e)),
            },
            None => {}
        }
    }

    debug!("Saved {} snapshot files", written.len());
    for path in &deleted {
        state.files.remove(path);
    }
    state.files.extend(written);
    state.dirty.clear();
    Ok(deleted)
}

/// Replace `path` with `data` unless it already holds exactly that content
fn write_if_changed(path: &Path, data: &[u8]) -> Result<()> {
    if let Ok(current) = fs::read(path) {
        if current == data {
            trace!("Snapshot file {:?} unchanged", path);
            return Ok(());
        }
    }
    write_file(path, data)
}

/// Replace `path` with `data` through a temporary file in the same directory
///
/// Readers never observe a partially written file.
pub fn write_file(path: &Path, data: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| AbideError::PathResolution(format!("{:?} has no parent", path)))?;
    fs::create_dir_all(dir).map_err(|e| AbideError::directory_creation(dir, e))?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| AbideError::file_write(path, e))?;
    tmp.write_all(data).map_err(|e| AbideError::file_write(path, e))?;
    tmp.persist(path)
        .map_err(|e| AbideError::file_write(path, e.error))?;

    trace!("Wrote {} bytes to {:?}", data.len(), path);
    Ok(())
}
