//! Integration tests simulating whole test-suite runs
//!
//! Every run opens a fresh engine on the same grouping root, the way
//! separate invocations of a test binary would.

use ::abide::*;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::info;

/// Test harness owning a grouping root
pub struct AbideTestHarness {
    pub root: TempDir,
}

impl AbideTestHarness {
    pub fn new() -> Self {
        Self {
            root: TempDir::new().unwrap(),
        }
    }

    /// Open an engine for one run of the `group` test binary
    pub fn run(&self, group: &str, mode: RunMode) -> Abide {
        AbideBuilder::new()
            .root(self.root.path())
            .group(group)
            .mode(mode)
            .parallel_workers(4)
            .build()
            .unwrap()
    }

    pub fn snapshot_dir(&self) -> PathBuf {
        self.root.path().join(SNAPSHOTS_DIR)
    }

    pub fn file(&self, group: &str) -> PathBuf {
        self.snapshot_dir().join(format!("{}.{}", group, SNAPSHOT_EXT))
    }

    pub fn read(&self, group: &str) -> String {
        fs::read_to_string(self.file(group)).unwrap()
    }

    pub fn write_config(&self, json: &str) {
        fs::write(self.root.path().join(CONFIG_FILE), json).unwrap();
    }

    pub fn snapshot_files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = fs::read_dir(self.snapshot_dir())
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        files.sort();
        files
    }
}

pub const FULL: RunMode = RunMode { update: false, restricted: false };
pub const UPDATE: RunMode = RunMode { update: true, restricted: false };
pub const FILTERED_UPDATE: RunMode = RunMode { update: true, restricted: true };

#[derive(Serialize)]
pub struct Account {
    pub id: u32,
    pub name: String,
    pub updated_at: String,
}

fn http_response(body: &str) -> String {
    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
        body.len(),
        body
    )
}

fn file_name(path: &Path) -> &str {
    path.file_name().unwrap().to_str().unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    #[traced_test]
    fn test_suite_lifecycle() {
        let harness = AbideTestHarness::new();

        // Initial recording run
        info!("Recording run");
        let abide = harness.run("api", UPDATE);
        abide.assert("list accounts", &http_response(r#"[{"id":1}]"#));
        abide.assert("get account", &Json(vec!["one", "two"]));
        abide.assert("empty state", "");
        abide.finish().unwrap();

        let recorded = harness.read("api");
        assert!(recorded.starts_with("/* snapshot: empty state */"));

        // Verification run: everything passes, file untouched
        info!("Verification run");
        let abide = harness.run("api", FULL);
        abide.assert("list accounts", &http_response(r#"[{"id":1}]"#));
        abide.assert("get account", &Json(vec!["one", "two"]));
        abide.assert("empty state", "");
        abide.finish().unwrap();
        assert_eq!(harness.read("api"), recorded);

        // A behaviour change is caught
        info!("Regression run");
        let abide = harness.run("api", FULL);
        let outcome = abide
            .evaluate("list accounts", &http_response(r#"[{"id":2}]"#))
            .unwrap();
        let message = outcome.failure_message().unwrap();
        assert!(message.contains("list accounts"));
        assert!(message.contains("ABIDE_UPDATE=1"));
        abide.finish().unwrap();
        assert_eq!(harness.read("api"), recorded);

        // Accepting the change drops what the suite no longer asserts
        info!("Update run");
        let abide = harness.run("api", UPDATE);
        abide.assert("list accounts", &http_response(r#"[{"id":2}]"#));
        abide.assert("get account", &Json(vec!["one", "two"]));
        let report = abide.finish().unwrap();
        assert_eq!(report.removed, vec![SnapshotId::from("empty state")]);

        let updated = harness.read("api");
        assert!(!updated.contains("empty state"));
        assert!(updated.contains(r#"[{"id":2}]"#));
    }

    #[test]
    fn test_filtered_update_run_keeps_untouched_snapshots() {
        let harness = AbideTestHarness::new();

        let abide = harness.run("suite", UPDATE);
        abide.assert("a", "1");
        abide.assert("b", "2");
        abide.finish().unwrap();

        let abide = harness.run("suite", FILTERED_UPDATE);
        abide.assert("a", "changed");
        let report = abide.finish().unwrap();
        assert!(!report.pruned);

        let abide = harness.run("suite", FULL);
        assert_eq!(abide.store().get("a").unwrap().value, "changed");
        assert_eq!(abide.store().get("b").unwrap().value, "2");
    }

    #[test]
    fn test_groups_share_one_directory() {
        let harness = AbideTestHarness::new();

        let abide = harness.run("users", UPDATE);
        abide.assert("create user", "201");
        abide.finish().unwrap();

        let abide = harness.run("orders", UPDATE);
        abide.assert("create order", "201");
        // A full run of one binary sees the other binary's records too
        let report = abide.finish().unwrap();
        assert!(report.removed.contains(&SnapshotId::from("create user")));

        let names: Vec<String> = harness
            .snapshot_files()
            .iter()
            .map(|p| file_name(p).to_string())
            .collect();
        assert_eq!(names, vec!["orders.snapshot"]);
    }

    #[test]
    fn test_record_moves_to_the_group_that_updates_it() {
        let harness = AbideTestHarness::new();

        let abide = harness.run("old", UPDATE);
        abide.assert("shared", "v1");
        abide.assert("stays", "x");
        abide.finish().unwrap();

        let abide = harness.run("new", FILTERED_UPDATE);
        abide.assert("shared", "v2");
        abide.finish().unwrap();

        assert_eq!(harness.read("old"), "/* snapshot: stays */\nx");
        assert_eq!(harness.read("new"), "/* snapshot: shared */\nv2");
    }

    #[test]
    fn test_emptied_file_is_deleted() {
        let harness = AbideTestHarness::new();

        let abide = harness.run("gone", UPDATE);
        abide.assert("only", "1");
        abide.finish().unwrap();
        assert!(harness.file("gone").exists());

        let abide = harness.run("gone", UPDATE);
        let report = abide.finish().unwrap();
        assert_eq!(report.files_deleted, vec![harness.file("gone")]);
        assert!(!harness.file("gone").exists());
    }

    #[test]
    fn test_normalization_end_to_end() {
        let harness = AbideTestHarness::new();
        harness.write_config(r#"{"defaults": {"updated_at": "2017-01-01T00:00:00Z"}}"#);

        let account = |ts: &str| Account {
            id: 7,
            name: "Ada".to_string(),
            updated_at: ts.to_string(),
        };

        let abide = harness.run("accounts", UPDATE);
        abide.assert("account", &Json(account("2026-10-18T09:15:00Z")));
        abide.finish().unwrap();
        assert!(harness.read("accounts").contains("2017-01-01T00:00:00Z"));

        // Volatile field differs, record still matches
        let abide = harness.run("accounts", FULL);
        let outcome = abide
            .evaluate("account", &Json(account("2030-01-01T12:00:00Z")))
            .unwrap();
        assert!(!outcome.is_failure());

        // Real change still caught
        let mut renamed = account("2030-01-01T12:00:00Z");
        renamed.name = "Grace".to_string();
        assert!(abide.evaluate("account", &Json(renamed)).unwrap().is_failure());
    }

    #[test]
    fn test_normalization_of_http_body() {
        let harness = AbideTestHarness::new();
        harness.write_config(r#"{"defaults": {"request_id": "REDACTED"}}"#);

        let abide = harness.run("http", UPDATE);
        abide.assert("response", &http_response(r#"{"ok":true,"request_id":"abc-1"}"#));
        abide.finish().unwrap();

        let abide = harness.run("http", FULL);
        let body = r#"{"ok":true,"request_id":"xyz-9"}"#;
        // Content-Length must match for the head to compare equal
        assert!(!abide.evaluate("response", &http_response(body)).unwrap().is_failure());

        let stored = abide.store().get("response").unwrap().value;
        assert!(stored.contains("REDACTED"));
        assert!(stored.starts_with("HTTP/1.1 200 OK"));
    }

    #[test]
    fn test_normalization_disabled() {
        let harness = AbideTestHarness::new();
        harness.write_config(r#"{"defaults": {"ts": 0}}"#);

        let abide = AbideBuilder::new()
            .root(harness.root.path())
            .group("raw")
            .update(true)
            .normalize(false)
            .build()
            .unwrap();
        assert!(abide.config().is_none());
        abide.assert("raw", r#"{"ts": 123}"#);
        abide.finish().unwrap();

        assert!(harness.read("raw").contains("123"));
    }

    #[test]
    fn test_parallel_assertions() {
        let harness = AbideTestHarness::new();
        let abide = harness.run("parallel", UPDATE);

        std::thread::scope(|scope| {
            for t in 0..8 {
                let abide = &abide;
                scope.spawn(move || {
                    for i in 0..25 {
                        abide.assert(&format!("t{} case {}", t, i), &format!("value {} {}", t, i));
                    }
                });
            }
        });
        abide.finish().unwrap();

        let abide = harness.run("parallel", FULL);
        assert_eq!(abide.store().len(), 200);
        for t in 0..8 {
            for i in 0..25 {
                let id = format!("t{} case {}", t, i);
                let value = format!("value {} {}", t, i);
                assert!(!abide.evaluate(&id, value.as_str()).unwrap().is_failure());
            }
        }
    }

    #[test]
    fn test_debugged_values() {
        #[derive(Debug)]
        #[allow(dead_code)]
        struct Point {
            x: i32,
            y: i32,
        }

        let harness = AbideTestHarness::new();
        let abide = harness.run("debug", UPDATE);
        abide.assert("point", &Debugged(Point { x: 1, y: 2 }));
        abide.finish().unwrap();

        let stored = harness.read("debug");
        assert!(stored.contains("Point"));
        assert!(stored.contains("x: 1"));

        let abide = harness.run("debug", FULL);
        let outcome = abide.evaluate("point", &Debugged(Point { x: 1, y: 3 })).unwrap();
        match outcome {
            Assertion::Mismatch { diff, .. } => assert!(diff.to_string().contains("+    y: 3,")),
            other => panic!("expected mismatch, got {:?}", other),
        }
    }

    #[test]
    #[should_panic(expected = "has not been recorded yet")]
    fn test_assert_panics_on_pending_snapshot() {
        let harness = AbideTestHarness::new();
        let abide = harness.run("panic", FULL);
        abide.assert("never recorded", "value");
    }
}
