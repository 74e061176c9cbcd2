//! Digest export: local durable copy first, then remote delivery.
//!
//! The local write is the durability boundary — once the digest file exists,
//! the session can no longer be lost, whatever the network does. Delivery is
//! behind a trait so the scheduler and tests can swap the transport.

use crate::error::{Error, Result};
use crate::storage;
use chrono::{DateTime, Utc};
use histsync_engine::render_digest;
use histsync_types::{PendingExport, Session};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Wire payload for the indexing endpoint. Field order is fixed by this
/// struct; the endpoint upserts idempotently by `session_key`.
#[derive(Debug, Serialize)]
struct ExportRequest<'a> {
    session_key: &'a str,
    source: &'a str,
    digest: &'a str,
    first_seen: DateTime<Utc>,
    last_activity: DateTime<Utc>,
    turn_count: usize,
}

#[derive(Debug)]
pub struct DeliveryError(pub String);

impl fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for DeliveryError {}

/// Remote delivery of one digest. Failure is never fatal to the caller: the
/// item goes to the retry queue instead.
pub trait Delivery {
    fn deliver(&self, item: &PendingExport) -> std::result::Result<(), DeliveryError>;
}

/// HTTP POST delivery to the indexing endpoint.
///
/// Redirects are not followed (a cross-origin redirect could leak the digest)
/// and ambient proxy configuration is ignored so proxy credentials are never
/// forwarded. 2xx is success; anything else is a delivery failure.
pub struct HttpDelivery {
    client: reqwest::blocking::Client,
    endpoint: String,
}

impl HttpDelivery {
    pub fn new(endpoint: String, timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .no_proxy()
            .build()
            .map_err(|e| Error::Config(format!("http client: {}", e)))?;
        Ok(HttpDelivery { client, endpoint })
    }
}

impl Delivery for HttpDelivery {
    fn deliver(&self, item: &PendingExport) -> std::result::Result<(), DeliveryError> {
        let request = ExportRequest {
            session_key: item.session_key.as_str(),
            source: &item.source_id,
            digest: &item.digest,
            first_seen: item.first_seen,
            last_activity: item.last_activity,
            turn_count: item.turn_count,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .map_err(|e| DeliveryError(format!("request failed: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(DeliveryError(format!("endpoint returned {}", status)))
        }
    }
}

/// Renders completed sessions and writes their durable local copies.
pub struct Exporter {
    export_dir: PathBuf,
}

impl Exporter {
    pub fn new(export_dir: PathBuf) -> Self {
        Exporter { export_dir }
    }

    /// Render the session's digest and write it to local durable storage.
    ///
    /// Returns the delivery candidate. A write failure is a storage error:
    /// fatal for the tick, and the caller restores the session so the export
    /// is retried next tick rather than dropped.
    pub fn export(&self, session: &Session, now: DateTime<Utc>) -> Result<PendingExport> {
        let digest = render_digest(session);
        let path = self.digest_path(session);
        storage::atomic_write(&path, digest.as_bytes())?;
        tracing::debug!(session = %session.key, path = %path.display(), "wrote digest");

        Ok(PendingExport {
            session_key: session.key.clone(),
            source_id: session.source_id.clone(),
            digest,
            first_seen: session.first_seen,
            last_activity: session.last_activity,
            turn_count: session.turn_count(),
            created_at: now,
            attempt_count: 0,
        })
    }

    /// Deterministic digest file location for a session.
    pub fn digest_path(&self, session: &Session) -> PathBuf {
        self.export_dir.join(format!("{}.md", session.key.file_stem()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use histsync_types::{SessionKey, Turn, TurnRole};
    use tempfile::TempDir;

    fn session() -> Session {
        Session::new(Turn {
            source_id: "term_log".to_string(),
            session_key: SessionKey::new("term_log", "20260825"),
            role: TurnRole::User,
            timestamp: Utc.with_ymd_and_hms(2026, 8, 25, 10, 0, 1).unwrap(),
            text: "hello".to_string(),
        })
    }

    #[test]
    fn export_writes_the_digest_and_returns_a_candidate() {
        let tmp = TempDir::new().unwrap();
        let exporter = Exporter::new(tmp.path().join("exports"));
        let session = session();

        let now = Utc.with_ymd_and_hms(2026, 8, 25, 10, 10, 0).unwrap();
        let pending = exporter.export(&session, now).unwrap();

        assert_eq!(pending.attempt_count, 0);
        assert_eq!(pending.turn_count, 1);
        assert_eq!(pending.created_at, now);

        let written = std::fs::read_to_string(exporter.digest_path(&session)).unwrap();
        assert_eq!(written, pending.digest);
        assert!(written.contains("hello"));
    }

    #[test]
    fn digest_path_is_deterministic_per_session_key() {
        let exporter = Exporter::new(PathBuf::from("/exports"));
        let a = exporter.digest_path(&session());
        let b = exporter.digest_path(&session());
        assert_eq!(a, b);
        assert!(a.to_string_lossy().ends_with(".md"));
    }
}
