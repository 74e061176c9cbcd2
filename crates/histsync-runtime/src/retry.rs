//! Durable at-least-once delivery buffer for failed exports.
//!
//! The queue owns every `PendingExport` the exporter hands it. Enqueue is
//! write-then-acknowledge: the item is on disk before the caller hears
//! success. There is no maximum retry count — data is never silently
//! dropped; a configurable attempt threshold raises a warning instead.

use crate::error::Result;
use crate::exporter::Delivery;
use crate::storage;
use histsync_types::PendingExport;
use std::collections::VecDeque;
use std::path::PathBuf;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DrainReport {
    pub delivered: usize,
    pub failed: usize,
}

pub struct RetryQueue {
    path: PathBuf,
    items: VecDeque<PendingExport>,
    warn_after_attempts: u32,
}

impl RetryQueue {
    /// Load the queue from disk; a missing file is an empty queue.
    pub fn load(path: PathBuf, warn_after_attempts: u32) -> Result<Self> {
        let items: Vec<PendingExport> = storage::read_json(&path)?.unwrap_or_default();
        Ok(RetryQueue {
            path,
            items: items.into(),
            warn_after_attempts,
        })
    }

    pub fn depth(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Durably append a failed export. The item counts one failed attempt
    /// already (the exporter's initial delivery).
    pub fn enqueue(&mut self, mut item: PendingExport) -> Result<()> {
        item.attempt_count = item.attempt_count.max(1);
        self.items.push_back(item);
        if let Err(err) = self.persist() {
            self.items.pop_back();
            return Err(err);
        }
        Ok(())
    }

    /// Retry every pending item once, in FIFO order.
    ///
    /// Delivered items are removed; failed items stay in place with their
    /// attempt count bumped. The queue is persisted after the pass — a crash
    /// mid-drain re-delivers at worst, never loses.
    pub fn drain(&mut self, delivery: &dyn Delivery) -> Result<DrainReport> {
        if self.items.is_empty() {
            return Ok(DrainReport::default());
        }

        let mut report = DrainReport::default();
        let mut kept = VecDeque::with_capacity(self.items.len());

        for mut item in std::mem::take(&mut self.items) {
            match delivery.deliver(&item) {
                Ok(()) => {
                    report.delivered += 1;
                    tracing::info!(session = %item.session_key, attempts = item.attempt_count, "pending export delivered");
                }
                Err(err) => {
                    item.attempt_count += 1;
                    report.failed += 1;
                    if item.attempt_count >= self.warn_after_attempts {
                        tracing::warn!(
                            session = %item.session_key,
                            attempts = item.attempt_count,
                            %err,
                            "pending export keeps failing; will keep retrying"
                        );
                    } else {
                        tracing::debug!(session = %item.session_key, attempts = item.attempt_count, %err, "delivery failed");
                    }
                    kept.push_back(item);
                }
            }
        }

        self.items = kept;
        self.persist()?;
        Ok(report)
    }

    pub fn persist(&self) -> Result<()> {
        let items: Vec<&PendingExport> = self.items.iter().collect();
        storage::atomic_write_json(&self.path, &items)
    }

    #[cfg(test)]
    pub(crate) fn items(&self) -> impl Iterator<Item = &PendingExport> {
        self.items.iter()
    }
}
