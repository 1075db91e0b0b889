//! Main test module for abide
//!
//! This module includes all test suites:
//! - Integration tests for multi-run scenarios
//! - Chaos tests for damaged snapshot directories
//! - Property-based tests for the file format

pub mod integration;
pub mod property;

#[cfg(test)]
mod edge_cases {
    use ::abide::*;
    use std::fs;
    use tempfile::TempDir;

    fn engine(root: &TempDir, update: bool) -> Abide {
        AbideBuilder::new()
            .root(root.path())
            .group("edge")
            .update(update)
            .build()
            .unwrap()
    }

    #[test]
    fn test_empty_root_creates_snapshot_directory() {
        let root = TempDir::new().unwrap();
        let abide = engine(&root, false);

        assert!(root.path().join(SNAPSHOTS_DIR).is_dir());
        assert!(abide.store().is_empty());
        abide.finish().unwrap();

        // Nothing recorded, nothing written
        let entries = fs::read_dir(root.path().join(SNAPSHOTS_DIR)).unwrap().count();
        assert_eq!(entries, 0);
    }

    #[test]
    fn test_unicode_ids_and_values() {
        let root = TempDir::new().unwrap();
        let cases = [
            ("héllo wörld", "ünïcödé"),
            ("日本語のテスト", "値"),
            ("emoji 🚀", "launch 🚀\nsecond line"),
        ];

        let abide = engine(&root, true);
        for (id, value) in cases {
            assert!(matches!(abide.evaluate(id, value).unwrap(), Assertion::Created { .. }));
        }
        abide.finish().unwrap();

        let abide = engine(&root, false);
        for (id, value) in cases {
            assert_eq!(abide.evaluate(id, value).unwrap(), Assertion::Matched { id: id.into() });
        }
    }

    #[test]
    fn test_empty_value() {
        let root = TempDir::new().unwrap();
        engine(&root, true).evaluate("empty", "").unwrap();

        let abide = engine(&root, false);
        assert_eq!(abide.store().get("empty").unwrap().value, "");
        assert!(!abide.evaluate("empty", "   \n").unwrap().is_failure());
        assert!(abide.evaluate("empty", "x").unwrap().is_failure());
    }

    #[test]
    fn test_surrounding_whitespace_is_ignored() {
        let root = TempDir::new().unwrap();
        engine(&root, true).evaluate("padded", "\n\n  body  \n\n").unwrap();

        let abide = engine(&root, false);
        assert_eq!(abide.store().get("padded").unwrap().value, "body");
        assert!(!abide.evaluate("padded", "body").unwrap().is_failure());
    }

    #[test]
    fn test_inner_whitespace_is_significant() {
        let root = TempDir::new().unwrap();
        engine(&root, true).evaluate("ws", "a  b\nc").unwrap();

        let abide = engine(&root, false);
        assert!(abide.evaluate("ws", "a b\nc").unwrap().is_failure());
        assert!(abide.evaluate("ws", "a  b\r\nc").unwrap().is_failure());
    }

    #[test]
    fn test_invalid_ids_are_rejected() {
        let root = TempDir::new().unwrap();
        let abide = engine(&root, true);

        for id in ["", "   ", " leading", "trailing ", "two\nlines", "closes */ early", "route /* snapshot: x"] {
            let err = abide.evaluate(id, "value").unwrap_err();
            assert!(matches!(err, AbideError::InvalidIdentifier(_)), "{:?}", id);
        }
        assert!(abide.store().is_empty());
    }

    #[test]
    fn test_value_containing_header_lookalike_lines() {
        let root = TempDir::new().unwrap();
        let value = "/* a comment */\nbody /* snapshot */";
        engine(&root, true).evaluate("tricky", value).unwrap();

        let abide = engine(&root, false);
        assert_eq!(abide.store().len(), 1);
        assert!(!abide.evaluate("tricky", value).unwrap().is_failure());
    }

    #[test]
    fn test_large_value() {
        let root = TempDir::new().unwrap();
        let value: String = (0..10_000).map(|i| format!("line {}\n", i)).collect();
        engine(&root, true).evaluate("large", value.as_str()).unwrap();

        let abide = engine(&root, false);
        assert!(!abide.evaluate("large", value.as_str()).unwrap().is_failure());

        let changed = value.replace("line 5000\n", "line five thousand\n");
        match abide.evaluate("large", changed.as_str()).unwrap() {
            Assertion::Mismatch { diff, .. } => {
                assert_eq!(diff.lines_added, 1);
                assert_eq!(diff.lines_deleted, 1);
            }
            other => panic!("expected mismatch, got {:?}", other),
        }
    }
}
