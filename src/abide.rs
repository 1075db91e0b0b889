//! Assertion orchestration
//!
//! [`Abide`] ties the store, the normalization config and the comparator
//! together. Construct one per test run with [`AbideBuilder`], pass it to
//! every assertion, and call [`Abide::finish`] exactly once at the end of the
//! run.
//!
//! ## Per-assertion flow
//!
//! 1. Render the value and normalize it with the config, if any.
//! 2. Look the id up in the store.
//! 3. Unknown id: record it in update mode, otherwise report
//!    [`Assertion::NewSnapshotPending`] carrying the full value.
//! 4. Known id: mark it seen and compare. A match succeeds silently; a
//!    mismatch is overwritten in update mode, otherwise reported as
//!    [`Assertion::Mismatch`] with the rendered diff.
//!
//! ## Examples
//!
//! ```rust,no_run
//! use abide::AbideBuilder;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let abide = AbideBuilder::from_env().build()?;
//!
//! abide.assert("greeting", "hello");
//!
//! // Prunes unused snapshots on a full update run, then saves
//! let report = abide.finish()?;
//! println!("removed {} stale snapshots", report.removed.len());
//! # Ok(())
//! # }
//! ```

use crate::assertable::Assertable;
use crate::config::Config;
use crate::diff::{self, SnapshotDiff, DEFAULT_CONTEXT_LINES};
use crate::error::{AbideError, Result};
use crate::mode::{RunMode, UPDATE_VAR};
use crate::store::SnapshotStore;
use crate::types::{PruneReport, SnapshotId};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

/// Outcome of a single assertion
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Assertion {
    /// The value matches the stored snapshot
    Matched {
        /// Snapshot id
        id: SnapshotId,
    },
    /// No snapshot existed and one was recorded (update mode)
    Created {
        /// Snapshot id
        id: SnapshotId,
    },
    /// The snapshot differed and was overwritten (update mode)
    Updated {
        /// Snapshot id
        id: SnapshotId,
        /// What changed
        diff: SnapshotDiff,
    },
    /// No snapshot exists yet and update mode is off
    NewSnapshotPending {
        /// Snapshot id
        id: SnapshotId,
        /// The value that would be recorded
        value: String,
    },
    /// The value differs from the stored snapshot and update mode is off
    Mismatch {
        /// Snapshot id
        id: SnapshotId,
        /// What changed
        diff: SnapshotDiff,
    },
}

impl Assertion {
    /// Id the assertion was made against
    pub fn id(&self) -> &SnapshotId {
        match self {
            Assertion::Matched { id }
            | Assertion::Created { id }
            | Assertion::Updated { id, .. }
            | Assertion::NewSnapshotPending { id, .. }
            | Assertion::Mismatch { id, .. } => id,
        }
    }

    /// Check if the current test should fail
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Assertion::NewSnapshotPending { .. } | Assertion::Mismatch { .. }
        )
    }

    /// Self-contained failure report, or `None` on success
    pub fn failure_message(&self) -> Option<String> {
        match self {
            Assertion::NewSnapshotPending { id, value } => Some(format!(
                "\n\nNew snapshot `{}` has not been recorded yet:\n\n{}\n\n{}\n",
                id,
                value,
                update_hint()
            )),
            Assertion::Mismatch { id, diff } => Some(format!(
                "\n\nExisting snapshot `{}` does not match results...\n\n{}\n{}\n",
                id,
                diff,
                update_hint()
            )),
            _ => None,
        }
    }
}

impl fmt::Display for Assertion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Assertion::Matched { id } => write!(f, "snapshot `{}` matched", id),
            Assertion::Created { id } => write!(f, "snapshot `{}` created", id),
            Assertion::Updated { id, .. } => write!(f, "snapshot `{}` updated", id),
            Assertion::NewSnapshotPending { id, .. } => write!(f, "snapshot `{}` is new", id),
            Assertion::Mismatch { id, .. } => write!(f, "snapshot `{}` does not match", id),
        }
    }
}

fn update_hint() -> String {
    format!(
        "If this change was intentional, run the tests again with {}=1",
        UPDATE_VAR
    )
}

/// Snapshot assertion engine for one test run
pub struct Abide {
    /// Grouping root
    root: PathBuf,
    /// Snapshot index
    store: SnapshotStore,
    /// Normalization config
    config: Option<Config>,
    /// Update and filter flags
    mode: RunMode,
    /// Context lines in rendered diffs
    context_lines: usize,
}

impl fmt::Debug for Abide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Abide")
            .field("root", &self.root)
            .field("store", &self.store)
            .field("config", &self.config.is_some())
            .field("mode", &self.mode)
            .field("context_lines", &self.context_lines)
            .finish()
    }
}

impl Abide {
    /// Open the engine for `root` with default settings and the run mode of
    /// the current process
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        AbideBuilder::from_env().root(root).build()
    }

    /// Grouping root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Underlying snapshot index
    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    /// Normalization config, if one was loaded
    pub fn config(&self) -> Option<&Config> {
        self.config.as_ref()
    }

    /// Run mode
    pub fn mode(&self) -> RunMode {
        self.mode
    }

    /// Evaluate `value` against the snapshot `id`
    ///
    /// Failures of the assertion itself are returned as
    /// [`Assertion::NewSnapshotPending`] / [`Assertion::Mismatch`];
    /// `Err` is reserved for infrastructure problems and invalid ids.
    #[instrument(skip(self, value))]
    pub fn evaluate<A>(&self, id: &str, value: &A) -> Result<Assertion>
    where
        A: Assertable + ?Sized,
    {
        let id = SnapshotId::from(id);
        id.validate()?;

        let candidate = self.normalize(&value.render_as_text()).trim().to_string();

        let Some(existing) = self.store.get(id.as_str()) else {
            if !self.mode.update {
                debug!("Snapshot `{}` pending", id);
                return Ok(Assertion::NewSnapshotPending { id, value: candidate });
            }
            info!("Creating snapshot `{}`", id);
            self.store.create_or_update(id.clone(), candidate)?;
            self.store.mark_seen(id.as_str());
            return Ok(Assertion::Created { id });
        };

        self.store.mark_seen(id.as_str());

        let stored = self.normalize(&existing.value);
        let Some(diff) = diff::compare(&stored, &candidate, self.context_lines) else {
            debug!("Snapshot `{}` matched", id);
            return Ok(Assertion::Matched { id });
        };

        if self.mode.update {
            info!("Updating snapshot `{}`", id);
            self.store.create_or_update(id.clone(), candidate)?;
            return Ok(Assertion::Updated { id, diff });
        }

        debug!(
            "Snapshot `{}` mismatched (+{} -{})",
            id, diff.lines_added, diff.lines_deleted
        );
        Ok(Assertion::Mismatch { id, diff })
    }

    /// Assert that `value` matches the snapshot `id`, panicking otherwise
    ///
    /// # Panics
    ///
    /// With the full value or diff when the assertion fails, and with the
    /// error message on infrastructure failures.
    #[track_caller]
    pub fn assert<A>(&self, id: &str, value: &A)
    where
        A: Assertable + ?Sized,
    {
        match self.evaluate(id, value) {
            Ok(outcome) => {
                if let Some(message) = outcome.failure_message() {
                    panic!("{}", message);
                }
            }
            Err(e) => panic!("abide: {}", e.user_message()),
        }
    }

    /// Teardown: prune untouched snapshots on a full update run, then save
    ///
    /// Consumes the engine so it can only run once.
    #[instrument(skip(self))]
    pub fn finish(self) -> Result<PruneReport> {
        let report = self.store.close(self.mode.should_prune())?;
        if report.has_removals() {
            info!("Removed snapshots: {:?}", report.removed);
        }
        Ok(report)
    }

    fn normalize(&self, text: &str) -> String {
        match &self.config {
            Some(config) => config.normalize_text(text),
            None => text.to_string(),
        }
    }
}

/// Builder for configuring [`Abide`]
///
/// # Examples
///
/// ```rust,no_run
/// use abide::{AbideBuilder, RunMode};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let abide = AbideBuilder::new()
///     .root("./tests")
///     .group("api")
///     .mode(RunMode { update: true, restricted: false })
///     .context_lines(5)
///     .build()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct AbideBuilder {
    root: Option<PathBuf>,
    group: Option<String>,
    mode: RunMode,
    context_lines: usize,
    parallel_workers: usize,
    normalize: bool,
    config: Option<Config>,
}

impl Default for AbideBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AbideBuilder {
    /// Create a builder with default settings and update mode off
    pub fn new() -> Self {
        Self {
            root: None,
            group: None,
            mode: RunMode::default(),
            context_lines: DEFAULT_CONTEXT_LINES,
            parallel_workers: num_cpus::get(),
            normalize: true,
            config: None,
        }
    }

    /// Create a builder whose run mode comes from the environment
    pub fn from_env() -> Self {
        Self::new().mode(RunMode::from_env())
    }

    /// Grouping root; defaults to the working directory
    pub fn root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    /// Grouping name; defaults to the root's directory name
    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// Update and filter flags
    pub fn mode(mut self, mode: RunMode) -> Self {
        self.mode = mode;
        self
    }

    /// Shorthand for toggling update mode only
    pub fn update(mut self, update: bool) -> Self {
        self.mode.update = update;
        self
    }

    /// Unchanged lines shown around each change in diffs
    pub fn context_lines(mut self, lines: usize) -> Self {
        self.context_lines = lines;
        self
    }

    /// Maximum number of snapshot files parsed concurrently (minimum 1)
    pub fn parallel_workers(mut self, count: usize) -> Self {
        self.parallel_workers = count.max(1);
        self
    }

    /// Whether to apply `abide.json` normalization
    pub fn normalize(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }

    /// Use this config instead of reading `abide.json`
    pub fn config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Open the store and load the config
    ///
    /// # Errors
    ///
    /// - [`AbideError::PathResolution`] if no root was given and the working
    ///   directory cannot be determined, or the root has no usable name
    /// - store and config errors, see [`SnapshotStore::open`] and [`Config::load`]
    pub fn build(self) -> Result<Abide> {
        let root = match self.root {
            Some(root) => root,
            None => std::env::current_dir().map_err(|e| AbideError::PathResolution(e.to_string()))?,
        };

        let group = match self.group {
            Some(group) => group,
            None => grouping_name(&root)?,
        };

        let store = SnapshotStore::open(&root, group, self.parallel_workers)?;

        let config = if !self.normalize {
            None
        } else if self.config.is_some() {
            self.config
        } else {
            Config::load(&root)?
        };

        info!(
            "Opened {} snapshots under {:?} (update: {}, restricted: {})",
            store.len(),
            root,
            self.mode.update,
            self.mode.restricted
        );

        Ok(Abide {
            root,
            store,
            config,
            mode: self.mode,
            context_lines: self.context_lines,
        })
    }
}

/// Directory name of the grouping root
fn grouping_name(root: &Path) -> Result<String> {
    let absolute = if root.is_absolute() {
        root.to_path_buf()
    } else {
        std::env::current_dir()
            .map_err(|e| AbideError::PathResolution(e.to_string()))?
            .join(root)
    };

    absolute
        .components()
        .next_back()
        .and_then(|c| match c {
            std::path::Component::Normal(name) => name.to_str().map(str::to_string),
            _ => None,
        })
        .ok_or_else(|| AbideError::PathResolution(format!("{:?} has no directory name", root)))
}
