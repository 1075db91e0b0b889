//! Property-based testing for abide
//!
//! Uses proptest to check the file format and the comparator across
//! randomly generated ids and values.

use ::abide::codec;
use ::abide::diff;
use ::abide::*;
use proptest::prelude::*;
use std::collections::BTreeMap;

/// Ids that survive validation
fn id_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_-][a-zA-Z0-9 _./:-]{0,30}[a-zA-Z0-9_-]|[a-zA-Z0-9_-]"
}

/// Values as the engine stores them: trimmed and free of record headers
fn value_strategy() -> impl Strategy<Value = String> {
    prop::collection::vec("[ -~]{0,40}", 0..8)
        .prop_map(|lines| lines.join("\n").trim().to_string())
        .prop_filter("value must not contain a record header", |v| {
            !v.contains(codec::SEPARATOR)
        })
}

fn records_strategy() -> impl Strategy<Value = BTreeMap<String, String>> {
    prop::collection::btree_map(id_strategy(), value_strategy(), 0..12)
}

fn to_snapshots(records: &BTreeMap<String, String>) -> Vec<Snapshot> {
    records
        .iter()
        .map(|(id, value)| Snapshot::new(id.as_str(), value.as_str()))
        .collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn prop_generated_ids_are_valid(id in id_strategy()) {
        prop_assert!(SnapshotId::from(id).is_valid());
    }

    #[test]
    fn prop_decode_inverts_encode(records in records_strategy()) {
        let encoded = codec::encode(&to_snapshots(&records));
        let decoded = codec::decode(&encoded);

        let roundtrip: BTreeMap<String, String> = decoded
            .into_values()
            .map(|s| (s.id.to_string(), s.value))
            .collect();
        prop_assert_eq!(roundtrip, records);
    }

    #[test]
    fn prop_encoding_ignores_input_order(records in records_strategy()) {
        let forward = to_snapshots(&records);
        let mut backward = forward.clone();
        backward.reverse();

        prop_assert_eq!(codec::encode(&forward), codec::encode(&backward));
    }

    #[test]
    fn prop_canonical_form_is_a_fixed_point(records in records_strategy()) {
        let encoded = codec::encode(&to_snapshots(&records));
        let reencoded = codec::encode(codec::decode(&encoded).values());
        prop_assert_eq!(reencoded, encoded);
    }

    #[test]
    fn prop_decode_never_panics(data in prop::collection::vec(any::<u8>(), 0..512)) {
        let decoded = codec::decode_with_report(&data);
        for id in decoded.snapshots.keys() {
            prop_assert!(!id.as_str().is_empty());
        }
    }

    #[test]
    fn prop_identical_values_never_differ(value in value_strategy()) {
        prop_assert!(diff::compare(&value, &value, 3).is_none());
    }

    #[test]
    fn prop_diff_counts_match_changes(
        stored in prop::collection::vec("[a-z]{1,6}", 1..20),
        candidate in prop::collection::vec("[a-z]{1,6}", 1..20),
    ) {
        let stored = stored.join("\n");
        let candidate = candidate.join("\n");

        match diff::compare(&stored, &candidate, 3) {
            None => prop_assert_eq!(&stored, &candidate),
            Some(d) => {
                prop_assert_ne!(&stored, &candidate);
                let added = d.hunks.iter().flat_map(|h| &h.changes)
                    .filter(|c| matches!(c, diff::LineChange::Added(..)))
                    .count();
                let deleted = d.hunks.iter().flat_map(|h| &h.changes)
                    .filter(|c| matches!(c, diff::LineChange::Deleted(..)))
                    .count();
                prop_assert_eq!(added, d.lines_added);
                prop_assert_eq!(deleted, d.lines_deleted);
                // Every stored line is either kept or deleted
                prop_assert!(d.lines_deleted <= stored.lines().count());
                prop_assert!(d.lines_added <= candidate.lines().count());
            }
        }
    }
}
