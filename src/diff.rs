//! Line-level comparison of a stored snapshot and a candidate value
//!
//! [`compare`] decides whether a candidate matches the stored value and, if
//! it does not, produces a [`SnapshotDiff`] that renders as a unified diff
//! with a configurable number of context lines:
//!
//! ```text
//! @@ -1,3 +1,3 @@
//!  HTTP/1.1 200 OK
//! -Content-Length: 5
//! +Content-Length: 7
//!
//! ```
//!
//! The comparison is exact and whitespace sensitive. The only leniency is
//! that the candidate is trimmed before comparing, since stored values are
//! always trimmed by the file format.
//!
//! ## Algorithm
//!
//! Common leading and trailing lines are stripped, the longest common
//! subsequence of the remaining lines is found by dynamic programming, and
//! the resulting edit script is grouped into hunks whose context windows
//! overlap. When the differing region is too large for the quadratic table
//! it is reported as one block deleted and one block added.

use colored::Colorize;
use std::fmt;
use tracing::debug;

/// Default number of unchanged lines shown around each change
pub const DEFAULT_CONTEXT_LINES: usize = 3;

/// Largest LCS table (old lines x new lines) computed before falling back
/// to a whole-block replacement
const MAX_LCS_CELLS: usize = 4_000_000;

/// A single line of a hunk
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineChange {
    /// Unchanged line (1-based line number in the stored value)
    Context(usize, String),
    /// Line only in the stored value
    Deleted(usize, String),
    /// Line only in the candidate (1-based line number in the candidate)
    Added(usize, String),
}

/// A contiguous region of changes with its surrounding context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffHunk {
    /// First stored line covered by the hunk
    pub from_line: usize,
    /// Number of stored lines covered
    pub from_count: usize,
    /// First candidate line covered by the hunk
    pub to_line: usize,
    /// Number of candidate lines covered
    pub to_count: usize,
    /// Lines in order
    pub changes: Vec<LineChange>,
}

impl DiffHunk {
    fn header(&self) -> String {
        format!(
            "@@ -{},{} +{},{} @@",
            self.from_line, self.from_count, self.to_line, self.to_count
        )
    }
}

/// Difference between a stored snapshot and a candidate value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotDiff {
    /// Changed regions
    pub hunks: Vec<DiffHunk>,
    /// Lines only in the candidate
    pub lines_added: usize,
    /// Lines only in the stored value
    pub lines_deleted: usize,
}

impl SnapshotDiff {
    /// Render with ANSI colors, honoring `NO_COLOR` and `CLICOLOR_FORCE`
    pub fn render_colored(&self) -> String {
        let mut out = String::new();
        for hunk in &self.hunks {
            out.push_str(&hunk.header().cyan().to_string());
            out.push('\n');
            for change in &hunk.changes {
                let line = match change {
                    LineChange::Context(_, text) => format!(" {}", text),
                    LineChange::Deleted(_, text) => format!("-{}", text).red().to_string(),
                    LineChange::Added(_, text) => format!("+{}", text).green().to_string(),
                };
                out.push_str(&line);
                out.push('\n');
            }
        }
        out
    }
}

impl fmt::Display for SnapshotDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for hunk in &self.hunks {
            writeln!(f, "{}", hunk.header())?;
            for change in &hunk.changes {
                match change {
                    LineChange::Context(_, text) => writeln!(f, " {}", text)?,
                    LineChange::Deleted(_, text) => writeln!(f, "-{}", text)?,
                    LineChange::Added(_, text) => writeln!(f, "+{}", text)?,
                }
            }
        }
        Ok(())
    }
}

/// Compare a stored value with a candidate
///
/// Returns `None` when they match after trimming the candidate.
pub fn compare(stored: &str, candidate: &str, context_lines: usize) -> Option<SnapshotDiff> {
    let candidate = candidate.trim();
    if stored == candidate {
        return None;
    }

    let old_lines: Vec<&str> = stored.split('\n').collect();
    let new_lines: Vec<&str> = candidate.split('\n').collect();

    let ops = compute_changes(&old_lines, &new_lines);
    let hunks = create_hunks(&ops, &old_lines, &new_lines, context_lines);

    let mut lines_added = 0;
    let mut lines_deleted = 0;
    for op in &ops {
        match op {
            ChangeOp::Insert(_) => lines_added += 1,
            ChangeOp::Delete(_) => lines_deleted += 1,
            ChangeOp::Keep(_, _) => {}
        }
    }

    Some(SnapshotDiff {
        hunks,
        lines_added,
        lines_deleted,
    })
}

/// Represents a change operation in the diff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChangeOp {
    Keep(usize, usize), // (old_line_idx, new_line_idx)
    Delete(usize),      // old_line_idx
    Insert(usize),      // new_line_idx
}

impl ChangeOp {
    fn is_change(&self) -> bool {
        !matches!(self, ChangeOp::Keep(_, _))
    }
}

/// Compute the edit script turning `old` into `new`
fn compute_changes(old: &[&str], new: &[&str]) -> Vec<ChangeOp> {
    let prefix = old.iter().zip(new).take_while(|(a, b)| a == b).count();
    let suffix = old[prefix..]
        .iter()
        .rev()
        .zip(new[prefix..].iter().rev())
        .take_while(|(a, b)| a == b)
        .count();

    let old_mid = &old[prefix..old.len() - suffix];
    let new_mid = &new[prefix..new.len() - suffix];

    let mut ops: Vec<ChangeOp> = (0..prefix).map(|i| ChangeOp::Keep(i, i)).collect();

    let lcs = compute_lcs(old_mid, new_mid);
    let (mut o, mut n) = (0, 0);
    for (lo, ln) in lcs.into_iter().chain(std::iter::once((old_mid.len(), new_mid.len()))) {
        while o < lo {
            ops.push(ChangeOp::Delete(prefix + o));
            o += 1;
        }
        while n < ln {
            ops.push(ChangeOp::Insert(prefix + n));
            n += 1;
        }
        if lo < old_mid.len() && ln < new_mid.len() {
            ops.push(ChangeOp::Keep(prefix + lo, prefix + ln));
            o += 1;
            n += 1;
        }
    }

    let old_tail = old.len() - suffix;
    let new_tail = new.len() - suffix;
    ops.extend((0..suffix).map(|i| ChangeOp::Keep(old_tail + i, new_tail + i)));
    ops
}

/// Longest common subsequence as (old_idx, new_idx) pairs
fn compute_lcs(old: &[&str], new: &[&str]) -> Vec<(usize, usize)> {
    let m = old.len();
    let n = new.len();

    if m.saturating_mul(n) > MAX_LCS_CELLS {
        debug!("Diff region {}x{} too large, replacing as one block", m, n);
        return Vec::new();
    }

    let mut dp = vec![vec![0usize; n + 1]; m + 1];
    for i in 1..=m {
        for j in 1..=n {
            dp[i][j] = if old[i - 1] == new[j - 1] {
                dp[i - 1][j - 1] + 1
            } else {
                dp[i - 1][j].max(dp[i][j - 1])
            };
        }
    }

    let mut lcs = Vec::with_capacity(dp[m][n]);
    let (mut i, mut j) = (m, n);
    while i > 0 && j > 0 {
        if old[i - 1] == new[j - 1] {
            lcs.push((i - 1, j - 1));
            i -= 1;
            j -= 1;
        } else if dp[i - 1][j] >= dp[i][j - 1] {
            i -= 1;
        } else {
            j -= 1;
        }
    }

    lcs.reverse();
    lcs
}

/// Group the edit script into hunks with `context` lines around each change
fn create_hunks(ops: &[ChangeOp], old: &[&str], new: &[&str], context: usize) -> Vec<DiffHunk> {
    // Merge the context windows of all changes into disjoint ranges
    let mut ranges: Vec<(usize, usize)> = Vec::new();
    for (i, op) in ops.iter().enumerate() {
        if !op.is_change() {
            continue;
        }
        let start = i.saturating_sub(context);
        let end = (i + context + 1).min(ops.len());
        match ranges.last_mut() {
            Some(last) if start <= last.1 => last.1 = end,
            _ => ranges.push((start, end)),
        }
    }

    // Lines of old/new consumed before each op
    let mut positions = Vec::with_capacity(ops.len());
    let (mut old_pos, mut new_pos) = (0, 0);
    for op in ops {
        positions.push((old_pos, new_pos));
        match op {
            ChangeOp::Keep(_, _) => {
                old_pos += 1;
                new_pos += 1;
            }
            ChangeOp::Delete(_) => old_pos += 1,
            ChangeOp::Insert(_) => new_pos += 1,
        }
    }

    ranges
        .into_iter()
        .map(|(start, end)| {
            let mut hunk = DiffHunk {
                from_line: positions[start].0 + 1,
                from_count: 0,
                to_line: positions[start].1 + 1,
                to_count: 0,
                changes: Vec::with_capacity(end - start),
            };
            for op in &ops[start..end] {
                match *op {
                    ChangeOp::Keep(o, _) => {
                        hunk.from_count += 1;
                        hunk.to_count += 1;
                        hunk.changes.push(LineChange::Context(o + 1, old[o].to_string()));
                    }
                    ChangeOp::Delete(o) => {
                        hunk.from_count += 1;
                        hunk.changes.push(LineChange::Deleted(o + 1, old[o].to_string()));
                    }
                    ChangeOp::Insert(n) => {
                        hunk.to_count += 1;
                        hunk.changes.push(LineChange::Added(n + 1, new[n].to_string()));
                    }
                }
            }
            hunk
        })
        .collect()
}
