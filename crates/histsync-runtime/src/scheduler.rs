//! The single cooperative scheduler loop.
//!
//! One tick runs discover → read → parse → scrub → ingest → sweep → export →
//! drain → status, to completion, before the next tick starts. All daemon
//! state lives in one [`Daemon`] value threaded through the loop, so nothing
//! here needs locking. Only cursors and the retry queue are durable; active
//! sessions are derived state and are rebuilt from source re-reads after a
//! restart.

use crate::config::DaemonConfig;
use crate::cursors::CursorStore;
use crate::error::{Error, Result};
use crate::exporter::{Delivery, Exporter, HttpDelivery};
use crate::retry::RetryQueue;
use crate::status::StatusSnapshot;
use chrono::{DateTime, Utc};
use histsync_engine::SessionAggregator;
use histsync_providers::discover;
use histsync_types::SessionState;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

pub struct Daemon {
    config: DaemonConfig,
    cursors: CursorStore,
    aggregator: SessionAggregator,
    retry: RetryQueue,
    exporter: Exporter,
    delivery: Box<dyn Delivery>,
    status_path: PathBuf,
    status: StatusSnapshot,
    consecutive_storage_failures: u32,
    last_heartbeat: Option<DateTime<Utc>>,
}

impl Daemon {
    /// Build a daemon over an explicit delivery transport. Tests use this
    /// with an in-memory double; `with_http_delivery` is the production path.
    pub fn new(config: DaemonConfig, state_dir: &Path, delivery: Box<dyn Delivery>) -> Result<Self> {
        let cursors = CursorStore::load(state_dir.join("cursors.json"))?;
        let retry = RetryQueue::load(state_dir.join("pending.json"), config.warn_after_attempts)?;
        let export_dir = config
            .export_dir
            .clone()
            .unwrap_or_else(|| state_dir.join("exports"));

        Ok(Daemon {
            exporter: Exporter::new(export_dir),
            status_path: state_dir.join("status.json"),
            status: StatusSnapshot::default(),
            aggregator: SessionAggregator::new(),
            consecutive_storage_failures: 0,
            last_heartbeat: None,
            config,
            cursors,
            retry,
            delivery,
        })
    }

    pub fn with_http_delivery(config: DaemonConfig, state_dir: &Path) -> Result<Self> {
        let delivery = HttpDelivery::new(
            config.endpoint_url.clone(),
            Duration::from_secs(config.http_timeout_secs),
        )?;
        Self::new(config, state_dir, Box::new(delivery))
    }

    /// Run one full poll cycle at the given instant.
    ///
    /// Per-source and per-record failures are contained inside; only
    /// local-durability failures surface as errors, which make the whole tick
    /// fail and be retried.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.poll_sources(now)?;

        let report = self.aggregator.sweep(now, self.config.idle_timeout(), self.config.min_turns);
        self.status.discarded_total += report.discarded as u64;

        self.export_ready(now)?;

        let drained = self.retry.drain(self.delivery.as_ref())?;
        if drained.delivered > 0 {
            self.status.exported_total += drained.delivered as u64;
            self.status.last_export_at = Some(now);
        }

        self.write_status(now);
        Ok(())
    }

    fn poll_sources(&mut self, now: DateTime<Utc>) -> Result<()> {
        let roots = self.config.effective_roots();

        for source in discover(&roots) {
            let chunk = match self.cursors.read_new(&source) {
                Ok(Some(chunk)) => chunk,
                Ok(None) => continue,
                Err(err @ Error::Storage(_)) => return Err(err),
                Err(err) => {
                    // Transient read failure: contained to this source,
                    // retried next cycle.
                    tracing::warn!(source = %source.id, %err, "source read failed");
                    self.status.error_total += 1;
                    continue;
                }
            };

            let turns =
                source
                    .format
                    .parse(&source.id, source.session_hint.as_deref(), &chunk, now);

            for mut turn in turns {
                // The scrub runs here, before the turn can reach the
                // aggregator or any durable store.
                turn.text = histsync_redact::scrub(&turn.text);
                self.aggregator.ingest(turn);
            }
        }

        Ok(())
    }

    fn export_ready(&mut self, now: DateTime<Utc>) -> Result<()> {
        for mut session in self.aggregator.take_ready() {
            let pending = match self.exporter.export(&session, now) {
                Ok(pending) => pending,
                Err(err) => {
                    // Digest write failed: put the session back so next tick
                    // retries the export instead of dropping it.
                    self.aggregator.restore(session);
                    return Err(err);
                }
            };

            match self.delivery.deliver(&pending) {
                Ok(()) => {
                    session.state = SessionState::Exported;
                    self.status.exported_total += 1;
                    self.status.last_export_at = Some(now);
                    tracing::info!(session = %session.key, turns = pending.turn_count, "session exported");
                }
                Err(err) => {
                    tracing::warn!(session = %session.key, %err, "delivery failed, queueing for retry");
                    if let Err(storage_err) = self.retry.enqueue(pending) {
                        self.aggregator.restore(session);
                        return Err(storage_err);
                    }
                }
            }
        }

        Ok(())
    }

    fn write_status(&mut self, now: DateTime<Utc>) {
        self.status.updated_at = Some(now);
        self.status.queue_depth = self.retry.depth();
        self.status.active_sessions = self.aggregator.active_count();
        self.status.cursor_count = self.cursors.len();

        if let Err(err) = self.status.write_to(&self.status_path) {
            tracing::warn!(%err, "could not write status snapshot");
        }
    }

    /// Time to sleep before the next tick.
    ///
    /// Base interval normally; halved (never below the fast interval) when
    /// an active session is within one base interval of its idle boundary,
    /// and fast while pending exports are waiting on the endpoint.
    pub fn next_sleep(&self, now: DateTime<Utc>) -> Duration {
        let base = Duration::from_secs(self.config.poll_interval_secs.max(1));
        let fast = Duration::from_secs(self.config.fast_poll_interval_secs.max(1));

        let mut sleep = base;
        if !self.retry.is_empty() {
            sleep = sleep.min(fast);
        }

        if let Some(deadline) = self.aggregator.next_idle_deadline(self.config.idle_timeout()) {
            let remaining = (deadline - now).num_seconds().max(0) as u64;
            if remaining < base.as_secs() {
                sleep = sleep.min((base / 2).max(fast));
            }
        }

        sleep
    }

    fn heartbeat(&mut self, now: DateTime<Utc>) {
        let due = match self.last_heartbeat {
            None => true,
            Some(last) => {
                (now - last).num_seconds() >= self.config.heartbeat_interval_secs as i64
            }
        };
        if !due {
            return;
        }
        self.last_heartbeat = Some(now);
        tracing::info!(
            sessions = self.aggregator.active_count(),
            cursors = self.cursors.len(),
            exported = self.status.exported_total,
            discarded = self.status.discarded_total,
            errors = self.status.error_total,
            pending = self.retry.depth(),
            "heartbeat"
        );
    }

    /// Drive ticks until `shutdown` is set. The in-flight tick always runs to
    /// completion; durable state is persisted as it changes, so shutdown only
    /// needs a final status write.
    pub fn run(&mut self, shutdown: &AtomicBool) -> Result<()> {
        tracing::info!(
            endpoint = %self.config.endpoint_url,
            idle_timeout_secs = self.config.idle_timeout_secs,
            poll_interval_secs = self.config.poll_interval_secs,
            "daemon starting"
        );

        while !shutdown.load(Ordering::Relaxed) {
            let now = Utc::now();
            match self.tick(now) {
                Ok(()) => self.consecutive_storage_failures = 0,
                Err(err) => {
                    self.status.error_total += 1;
                    self.consecutive_storage_failures += 1;
                    tracing::error!(
                        %err,
                        consecutive = self.consecutive_storage_failures,
                        "tick failed"
                    );
                    if self.consecutive_storage_failures
                        >= self.config.max_consecutive_storage_failures
                    {
                        // Spinning on a broken disk helps nobody; exit and
                        // let the supervisor restart us.
                        return Err(err);
                    }
                }
            }

            self.heartbeat(Utc::now());
            sleep_until_or_shutdown(self.next_sleep(Utc::now()), shutdown);
        }

        if let Err(err) = self.cursors.persist() {
            tracing::error!(%err, "final cursor persist failed");
        }
        if let Err(err) = self.retry.persist() {
            tracing::error!(%err, "final queue persist failed");
        }
        self.write_status(Utc::now());
        tracing::info!(exported = self.status.exported_total, "daemon shutting down");
        Ok(())
    }

    pub fn queue_depth(&self) -> usize {
        self.retry.depth()
    }

    pub fn status(&self) -> &StatusSnapshot {
        &self.status
    }
}

fn sleep_until_or_shutdown(total: Duration, shutdown: &AtomicBool) {
    let deadline = Instant::now() + total;
    while !shutdown.load(Ordering::Relaxed) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        std::thread::sleep((deadline - now).min(Duration::from_millis(250)));
    }
}
