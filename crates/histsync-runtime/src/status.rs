//! Status snapshot for the external health collaborator.
//!
//! Written atomically once per tick so queue depth and the last successful
//! export time are observable without talking to the daemon.

use crate::error::Result;
use crate::storage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub updated_at: Option<DateTime<Utc>>,
    pub last_export_at: Option<DateTime<Utc>>,
    pub queue_depth: usize,
    pub active_sessions: usize,
    pub cursor_count: usize,
    pub exported_total: u64,
    pub discarded_total: u64,
    pub error_total: u64,
}

impl StatusSnapshot {
    pub fn write_to(&self, path: &Path) -> Result<()> {
        storage::atomic_write_json(path, self)
    }

    pub fn read_from(path: &Path) -> Result<Option<Self>> {
        storage::read_json(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn snapshot_round_trips() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("status.json");

        let snapshot = StatusSnapshot {
            updated_at: Some(Utc::now()),
            queue_depth: 3,
            exported_total: 7,
            ..Default::default()
        };
        snapshot.write_to(&path).unwrap();

        let loaded = StatusSnapshot::read_from(&path).unwrap().unwrap();
        assert_eq!(loaded.queue_depth, 3);
        assert_eq!(loaded.exported_total, 7);
        assert!(loaded.last_export_at.is_none());
    }
}
