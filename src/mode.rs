//! Run mode resolution
//!
//! Two inputs drive the orchestrator and must be known before the first
//! assertion runs:
//!
//! - **update mode**: record new snapshots and overwrite mismatching ones
//!   instead of failing. Enabled with `ABIDE_UPDATE=1`.
//! - **restricted run**: only a subset of tests executes, so snapshots that
//!   were not touched must not be pruned. Detected from a positional test
//!   filter or `--skip` in the test binary's arguments, or forced with
//!   `ABIDE_RESTRICTED=1`.

use std::env;

/// Environment variable enabling update mode
pub const UPDATE_VAR: &str = "ABIDE_UPDATE";

/// Environment variable forcing a restricted run
pub const RESTRICTED_VAR: &str = "ABIDE_RESTRICTED";

/// libtest options whose value is a separate argument
const OPTIONS_WITH_VALUE: &[&str] = &[
    "--test-threads",
    "--color",
    "--format",
    "--logfile",
    "--shuffle-seed",
    "-Z",
];

/// Update and filtering flags for one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunMode {
    /// Record and overwrite snapshots instead of failing
    pub update: bool,
    /// Only part of the suite runs
    pub restricted: bool,
}

impl RunMode {
    /// Resolve from the process environment and arguments
    pub fn from_env() -> Self {
        Self::from_parts(
            env::var(UPDATE_VAR).ok().as_deref(),
            env::var(RESTRICTED_VAR).ok().as_deref(),
            env::args().skip(1),
        )
    }

    /// Resolve from explicit inputs; `args` excludes the program name
    pub fn from_parts<I, S>(update: Option<&str>, restricted: Option<&str>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            update: update.is_some_and(is_truthy),
            restricted: restricted.is_some_and(is_truthy) || has_test_filter(args),
        }
    }

    /// Whether teardown should drop snapshots no assertion touched
    pub fn should_prune(&self) -> bool {
        self.update && !self.restricted
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// Detect a libtest filter or skip among the arguments
fn has_test_filter<I, S>(args: I) -> bool
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        let arg = arg.as_ref();
        if arg == "--skip" || arg.starts_with("--skip=") {
            return true;
        }
        if OPTIONS_WITH_VALUE.contains(&arg) {
            args.next();
            continue;
        }
        if !arg.starts_with('-') {
            return true;
        }
    }
    false
}
