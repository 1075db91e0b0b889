//! Snapshot file encoding and decoding
//!
//! A snapshot file is plain text. Each record is a header line made of
//! [`SEPARATOR`], the id and [`HEADER_TERMINATOR`], followed by the value and
//! a blank line:
//!
//! ```text
//! /* snapshot: first route */
//! HTTP/1.1 200 OK
//! Content-Type: application/json
//!
//! {"ok": true}
//!
//! /* snapshot: second route */
//! HTTP/1.1 404 Not Found
//! ```
//!
//! Records are written in ascending byte order of their ids and the whole
//! output is trimmed, so encoding the same records always yields the same
//! bytes and files diff cleanly under version control.
//!
//! Decoding is tolerant: chunks that cannot be split into an id and a value
//! are dropped and reported instead of failing the whole file, since
//! snapshot files are routinely edited by hand.

use crate::types::{Snapshot, SnapshotId};
use std::collections::BTreeMap;
use tracing::trace;

/// Token that opens every record header
pub const SEPARATOR: &str = "/* snapshot: ";

/// Token that closes every record header
pub const HEADER_TERMINATOR: &str = " */";

/// Records of one file, ordered by id
pub type Snapshots = BTreeMap<SnapshotId, Snapshot>;

/// Output of [`decode_with_report`]
#[derive(Debug, Clone, Default)]
pub struct Decoded {
    /// Records that were parsed successfully
    pub snapshots: Snapshots,
    /// Leading text of every chunk that was discarded
    pub discarded: Vec<String>,
}

/// Encode records into the snapshot file format
///
/// Only `id` and `value` are written; paths and transient flags are not
/// part of the format.
pub fn encode<'a, I>(snapshots: I) -> Vec<u8>
where
    I: IntoIterator<Item = &'a Snapshot>,
{
    let mut sorted: Vec<&Snapshot> = snapshots.into_iter().collect();
    sorted.sort_by(|a, b| a.id.cmp(&b.id));

    let mut data = String::new();
    for snapshot in sorted {
        data.push_str(SEPARATOR);
        data.push_str(snapshot.id.as_str());
        data.push_str(HEADER_TERMINATOR);
        data.push('\n');
        data.push_str(&snapshot.value);
        data.push_str("\n\n");
    }

    data.trim().as_bytes().to_vec()
}

/// Decode a snapshot file, silently dropping malformed chunks
pub fn decode(data: &[u8]) -> Snapshots {
    decode_with_report(data).snapshots
}

/// Decode a snapshot file and report which chunks were dropped
///
/// Invalid UTF-8 is replaced rather than rejected. When an id occurs twice
/// in the same file the later record wins.
pub fn decode_with_report(data: &[u8]) -> Decoded {
    let text = String::from_utf8_lossy(data);
    let mut decoded = Decoded::default();

    let mut chunks = text.split(SEPARATOR);

    // Text before the first separator does not belong to any record
    if let Some(preamble) = chunks.next() {
        if !preamble.trim().is_empty() {
            decoded.discarded.push(preview(preamble));
        }
    }

    for chunk in chunks {
        if chunk.is_empty() {
            continue;
        }
        match split_chunk(chunk) {
            Some((id, value)) => {
                trace!("Decoded snapshot {:?} ({} bytes)", id, value.len());
                let id = SnapshotId::from(id);
                decoded.snapshots.insert(id.clone(), Snapshot::new(id, value));
            }
            None => decoded.discarded.push(preview(chunk)),
        }
    }

    decoded
}

/// Split a chunk into its id and its trimmed value
fn split_chunk(chunk: &str) -> Option<(&str, &str)> {
    let (header, body) = chunk.split_once('\n').unwrap_or((chunk, ""));
    let id = header
        .trim_end()
        .strip_suffix(HEADER_TERMINATOR.trim_start())?
        .trim_end();

    if id.is_empty() {
        return None;
    }

    Some((id, body.trim()))
}

fn preview(chunk: &str) -> String {
    chunk.lines().next().unwrap_or_default().chars().take(60).collect()
}
