//! Full-daemon flows over real files: ingest to delivery, secret scrubbing,
//! retry on endpoint failure, and recovery across a restart.

use chrono::{TimeZone, Utc};
use histsync_providers::default_roots;
use histsync_runtime::{Daemon, DaemonConfig, Delivery, DeliveryError, SourceConfig};
use histsync_types::PendingExport;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use walkdir::WalkDir;

/// Shared-handle delivery double. Outcomes are popped per call (empty means
/// success) and every delivered payload is captured for inspection.
#[derive(Clone, Default)]
struct FakeEndpoint {
    outcomes: Arc<Mutex<VecDeque<bool>>>,
    delivered: Arc<Mutex<Vec<PendingExport>>>,
}

impl FakeEndpoint {
    fn failing_times(n: usize) -> Self {
        let endpoint = FakeEndpoint::default();
        endpoint
            .outcomes
            .lock()
            .unwrap()
            .extend(std::iter::repeat_n(false, n));
        endpoint
    }

    fn delivered(&self) -> Vec<PendingExport> {
        self.delivered.lock().unwrap().clone()
    }
}

impl Delivery for FakeEndpoint {
    fn deliver(&self, item: &PendingExport) -> Result<(), DeliveryError> {
        match self.outcomes.lock().unwrap().pop_front() {
            Some(false) => Err(DeliveryError("endpoint offline".to_string())),
            _ => {
                self.delivered.lock().unwrap().push(item.clone());
                Ok(())
            }
        }
    }
}

/// A config that polls exactly one test-owned file: every built-in source is
/// disabled so a developer machine's real history never leaks into the test.
fn config_for(log_path: &Path) -> DaemonConfig {
    let mut config = DaemonConfig::default();
    for root in default_roots() {
        config.sources.insert(
            root.name,
            SourceConfig {
                enabled: false,
                path: None,
                format: None,
            },
        );
    }
    config.sources.insert(
        "term_log".to_string(),
        SourceConfig {
            enabled: true,
            path: Some(log_path.to_path_buf()),
            format: Some("timestamp_log".to_string()),
        },
    );
    config
}

fn files_under(dir: &Path) -> Vec<std::path::PathBuf> {
    WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_file())
        .map(|e| e.into_path())
        .collect()
}

#[test]
fn session_flows_from_log_file_to_redacted_delivered_digest() {
    let tmp = TempDir::new().unwrap();
    let state_dir = tmp.path().join("state");
    let log = tmp.path().join("term.log");
    std::fs::write(
        &log,
        "[10:00:01] user: hello my key is sk-ABCDEFGH1234567890abcd\n\
         [10:00:02] assistant: hi there\n",
    )
    .unwrap();

    let endpoint = FakeEndpoint::default();
    let mut daemon =
        Daemon::new(config_for(&log), &state_dir, Box::new(endpoint.clone())).unwrap();

    // First poll ingests both turns; the session is still active.
    let t1 = Utc.with_ymd_and_hms(2026, 8, 25, 10, 0, 30).unwrap();
    daemon.tick(t1).unwrap();
    assert!(endpoint.delivered().is_empty());
    assert_eq!(daemon.status().active_sessions, 1);

    // 308s after the last turn the idle timeout (300s) has passed.
    let t2 = Utc.with_ymd_and_hms(2026, 8, 25, 10, 5, 10).unwrap();
    daemon.tick(t2).unwrap();

    let delivered = endpoint.delivered();
    assert_eq!(delivered.len(), 1);
    let digest = &delivered[0].digest;
    assert!(digest.contains("hello my key is [REDACTED:api-key]"), "{digest}");
    assert!(digest.contains("hi there"));
    assert_eq!(delivered[0].turn_count, 2);
    assert_eq!(daemon.status().exported_total, 1);
    assert_eq!(daemon.queue_depth(), 0);

    // The raw secret must not survive into any persisted artifact.
    for path in files_under(&state_dir) {
        let contents = std::fs::read_to_string(&path).unwrap_or_default();
        assert!(
            !contents.contains("sk-ABCDEFGH1234567890abcd"),
            "secret leaked into {}",
            path.display()
        );
    }
}

#[test]
fn failed_delivery_is_queued_and_drained_on_a_later_tick() {
    let tmp = TempDir::new().unwrap();
    let state_dir = tmp.path().join("state");
    let log = tmp.path().join("term.log");
    std::fs::write(&log, "[09:00:00] user: question\n[09:00:05] assistant: answer\n").unwrap();

    let endpoint = FakeEndpoint::failing_times(2);
    let mut daemon =
        Daemon::new(config_for(&log), &state_dir, Box::new(endpoint.clone())).unwrap();

    let t1 = Utc.with_ymd_and_hms(2026, 8, 25, 9, 0, 10).unwrap();
    daemon.tick(t1).unwrap();

    // Export attempt and the drain retry both fail; the digest is queued.
    let t2 = Utc.with_ymd_and_hms(2026, 8, 25, 9, 10, 0).unwrap();
    daemon.tick(t2).unwrap();
    assert_eq!(daemon.queue_depth(), 1);
    assert!(endpoint.delivered().is_empty());
    assert!(state_dir.join("pending.json").exists());

    // The endpoint comes back; the queued item is delivered and removed.
    let t3 = Utc.with_ymd_and_hms(2026, 8, 25, 9, 10, 30).unwrap();
    daemon.tick(t3).unwrap();
    assert_eq!(daemon.queue_depth(), 0);

    let delivered = endpoint.delivered();
    assert_eq!(delivered.len(), 1);
    assert!(delivered[0].digest.contains("question"));
    assert!(delivered[0].attempt_count >= 1);
}

#[test]
fn queued_export_survives_a_daemon_restart() {
    let tmp = TempDir::new().unwrap();
    let state_dir = tmp.path().join("state");
    let log = tmp.path().join("term.log");
    std::fs::write(&log, "[14:00:00] user: before crash\n[14:00:03] assistant: noted\n").unwrap();

    {
        let endpoint = FakeEndpoint::failing_times(10);
        let mut daemon =
            Daemon::new(config_for(&log), &state_dir, Box::new(endpoint.clone())).unwrap();
        let t1 = Utc.with_ymd_and_hms(2026, 8, 25, 14, 0, 10).unwrap();
        daemon.tick(t1).unwrap();
        let t2 = Utc.with_ymd_and_hms(2026, 8, 25, 14, 10, 0).unwrap();
        daemon.tick(t2).unwrap();
        assert_eq!(daemon.queue_depth(), 1);
    }

    // New process, healthy endpoint: the pending digest is delivered.
    let endpoint = FakeEndpoint::default();
    let mut daemon =
        Daemon::new(config_for(&log), &state_dir, Box::new(endpoint.clone())).unwrap();
    let t3 = Utc.with_ymd_and_hms(2026, 8, 25, 14, 11, 0).unwrap();
    daemon.tick(t3).unwrap();

    assert_eq!(daemon.queue_depth(), 0);
    let delivered = endpoint.delivered();
    assert_eq!(delivered.len(), 1);
    assert!(delivered[0].digest.contains("before crash"));
}

#[test]
fn short_sessions_are_discarded_without_delivery() {
    let tmp = TempDir::new().unwrap();
    let state_dir = tmp.path().join("state");
    let log = tmp.path().join("term.log");
    std::fs::write(&log, "[11:00:00] user: just one line\n").unwrap();

    let endpoint = FakeEndpoint::default();
    let mut daemon =
        Daemon::new(config_for(&log), &state_dir, Box::new(endpoint.clone())).unwrap();

    let t1 = Utc.with_ymd_and_hms(2026, 8, 25, 11, 0, 5).unwrap();
    daemon.tick(t1).unwrap();
    let t2 = Utc.with_ymd_and_hms(2026, 8, 25, 11, 10, 0).unwrap();
    daemon.tick(t2).unwrap();

    assert!(endpoint.delivered().is_empty());
    assert_eq!(daemon.status().discarded_total, 1);
    assert_eq!(daemon.status().active_sessions, 0);
}
